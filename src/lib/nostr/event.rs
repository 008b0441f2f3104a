use nostr::{Event, Timestamp};

pub const KIND_DATE_EVENT: u16 = 31922;
pub const KIND_TIME_EVENT: u16 = 31923;
pub const KIND_CALENDAR: u16 = 31924;

/// Kinds accepted into the candidate pool.
pub const CALENDAR_KINDS: [u16; 3] = [KIND_DATE_EVENT, KIND_TIME_EVENT, KIND_CALENDAR];

/// Values of every tag named `name` that carries at least one value.
///
/// Tags with fewer than two elements are skipped.
pub fn tag_values<'a>(event: &'a Event, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    event.tags.iter().filter_map(move |tag| match tag.as_slice() {
        [tag_name, value, ..] if tag_name == name => Some(value.as_str()),
        _ => None,
    })
}

/// Last `d` tag value, the event's stable identifier.
pub fn identifier(event: &Event) -> Option<&str> {
    tag_values(event, "d").last()
}

pub fn is_calendar_kind(event: &Event) -> bool {
    CALENDAR_KINDS.contains(&event.kind.as_u16())
}

pub fn unix_now() -> u64 {
    Timestamp::now().as_u64()
}
