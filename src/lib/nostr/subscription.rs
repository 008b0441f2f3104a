use nostr::Filter;

/// Why a subscription was opened. The id prefix is how relays echo it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionPurpose {
    DirectMessages,
    MonitoredEvents,
    Pubkeys,
    Profiles,
    EventById,
}

impl SubscriptionPurpose {
    pub const ALL: [SubscriptionPurpose; 5] = [
        SubscriptionPurpose::DirectMessages,
        SubscriptionPurpose::MonitoredEvents,
        SubscriptionPurpose::Pubkeys,
        SubscriptionPurpose::Profiles,
        SubscriptionPurpose::EventById,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            SubscriptionPurpose::DirectMessages => "my_dms",
            SubscriptionPurpose::MonitoredEvents => "my_events",
            SubscriptionPurpose::Pubkeys => "my_pubkeys",
            SubscriptionPurpose::Profiles => "my_profiles",
            SubscriptionPurpose::EventById => "my_eventbyid",
        }
    }

    /// Decode a relay-echoed subscription id.
    pub fn from_subscription_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| id.starts_with(p.prefix()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Open,
    AwaitingClose,
    Closed,
}

pub struct NostrSubscription {
    pub id: String,
    pub filters: Vec<Filter>,
    pub state: SubscriptionState,
}

impl NostrSubscription {
    pub fn new(id: String, filters: Vec<Filter>) -> Self {
        Self {
            id,
            filters,
            state: SubscriptionState::Open,
        }
    }
}
