//! Decides which fetched events belong in the aggregate calendar.
//!
//! One criterion is tested at a time against everything fetched so far.
//! Events that match are consumed and leave the pool; everything else stays
//! so that a later criterion, or the next pass, may still pick it up.

use log::*;
use nostr::{Event, EventId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::nostr::event::{identifier, is_calendar_kind, tag_values, KIND_CALENDAR, KIND_DATE_EVENT, KIND_TIME_EVENT};

/// One entry of the calendar's search list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriterion {
    pub kind: u16,
    /// Hex or npub public key whose events are fetched.
    pub author: String,
    /// Identifier of a calendar (kind 31924) whose references are absorbed.
    #[serde(default)]
    pub d: String,
    /// Case-insensitive text a date or time event must mention.
    #[serde(default)]
    pub phrase: String,
}

/// Fetched events awaiting a matching criterion.
#[derive(Debug, Default)]
pub struct CandidatePool {
    events: Vec<Event>,
    ids: HashSet<EventId>,
}

impl CandidatePool {
    /// Add an event if it is a calendar kind and not already pooled.
    pub fn ingest(&mut self, event: Event) -> bool {
        if !is_calendar_kind(&event) {
            debug!("Ignoring event {} of kind {}", event.id, event.kind);
            return false;
        }

        if !self.ids.insert(event.id) {
            return false;
        }

        self.events.push(event);
        true
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// `a` tag values gathered during one pass, first occurrence wins.
#[derive(Debug, Default, Clone)]
pub struct CrossReferences {
    ordered: Vec<String>,
    seen: HashSet<String>,
}

impl CrossReferences {
    pub fn insert(&mut self, reference: String) -> bool {
        if self.seen.contains(&reference) {
            return false;
        }
        self.seen.insert(reference.clone());
        self.ordered.push(reference);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// References `event` contributes under `criterion`, or `None` when it does
/// not qualify and must stay in the pool.
pub fn evaluate(criterion: &SearchCriterion, event: &Event, now: u64) -> Option<Vec<String>> {
    match event.kind.as_u16() {
        KIND_CALENDAR => {
            if !tag_values(event, "d").any(|d| d == criterion.d) {
                return None;
            }
            Some(tag_values(event, "a").map(str::to_string).collect())
        }
        kind @ (KIND_DATE_EVENT | KIND_TIME_EVENT) => {
            let d = identifier(event)?;

            if !mentions_phrase(event, &criterion.phrase) || !ends_after(event, now) {
                return None;
            }
            Some(vec![format!("{}:{}:{}", kind, event.pubkey.to_hex(), d)])
        }
        _ => None,
    }
}

fn mentions_phrase(event: &Event, phrase: &str) -> bool {
    let phrase = phrase.to_lowercase();

    event.content.to_lowercase().contains(&phrase)
        || tag_values(event, "name")
            .chain(tag_values(event, "description"))
            .any(|value| value.to_lowercase().contains(&phrase))
}

/// At least one parseable `start` or `end` timestamp lies after `now`.
fn ends_after(event: &Event, now: u64) -> bool {
    tag_values(event, "start")
        .chain(tag_values(event, "end"))
        .filter_map(|value| value.trim().parse::<i64>().ok())
        .any(|ts| ts > now as i64)
}

/// Test every pooled event against `criterion`, moving the references of
/// those that qualify into `references`. Returns how many were consumed.
pub fn match_criterion(criterion: &SearchCriterion, pool: &mut CandidatePool, references: &mut CrossReferences, now: u64) -> usize {
    let mut consumed = 0;

    for event in std::mem::take(&mut pool.events) {
        match evaluate(criterion, &event, now) {
            Some(found) => {
                debug!("Event {} matched {}:{}", event.id, criterion.kind, criterion.author);
                for reference in found {
                    references.insert(reference);
                }
                pool.ids.remove(&event.id);
                consumed += 1;
            }
            None => pool.events.push(event),
        }
    }

    consumed
}
