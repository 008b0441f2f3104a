use nostr::{EventBuilder, Kind, Tag};

use crate::calendar::matcher::CrossReferences;
use crate::config::CalendarDefinition;
use crate::nostr::event::KIND_CALENDAR;
use crate::nostr::keys::custom_tag;

/// The composite calendar republished after every pass.
#[derive(Debug, Clone)]
pub struct CalendarAggregate {
    pub uuid: String,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub content: String,
    pub maintainer_pubkey: String,
    pub cross_references: CrossReferences,
}

impl CalendarAggregate {
    pub fn new(calendar: &CalendarDefinition, maintainer_pubkey: &str, cross_references: CrossReferences) -> Self {
        Self {
            uuid: calendar.uuid.clone(),
            name: calendar.name.clone(),
            description: calendar.description.clone(),
            image_url: calendar.image.clone(),
            content: calendar.content.clone(),
            maintainer_pubkey: maintainer_pubkey.to_string(),
            cross_references,
        }
    }

    pub fn tags(&self) -> Vec<Tag> {
        let mut tags = vec![
            custom_tag("d", [self.uuid.as_str()]),
            custom_tag("name", [self.name.as_str()]),
            custom_tag("description", [self.description.as_str()]),
            custom_tag("image", [self.image_url.as_str()]),
            custom_tag("p", [self.maintainer_pubkey.as_str(), "", "Maintainer"]),
        ];

        tags.extend(self.cross_references.iter().map(|a| custom_tag("a", [a])));

        tags
    }

    pub fn to_builder(&self) -> EventBuilder {
        EventBuilder::new(Kind::from(KIND_CALENDAR), self.content.clone()).tags(self.tags())
    }
}
