//! Decoding of relay frames.
//!
//! Relays sometimes publish events carrying a tag that is not a list of
//! strings, e.g. `["end", 1700000000]`. Such a tag would make the whole
//! `EVENT` frame unreadable, so it is dropped and the rest of the event kept.

use log::*;
use nostr::{JsonUtil, RelayMessage};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid relay message: {0}")]
    Relay(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn parse_relay_message(text: &str) -> Result<RelayMessage, MessageError> {
    let strict_error = match RelayMessage::from_json(text) {
        Ok(message) => return Ok(message),
        Err(e) => e.to_string(),
    };

    let mut frame: Value = serde_json::from_str(text)?;
    let dropped = drop_malformed_tags(&mut frame);
    if dropped == 0 {
        return Err(MessageError::Relay(strict_error));
    }

    debug!("Dropped {dropped} malformed tags from relay frame");

    RelayMessage::from_json(frame.to_string()).map_err(|e| MessageError::Relay(e.to_string()))
}

/// Remove every tag of an `EVENT` frame that is empty or holds a non-string.
/// Returns how many were removed.
fn drop_malformed_tags(frame: &mut Value) -> usize {
    if frame.get(0).and_then(Value::as_str) != Some("EVENT") {
        return 0;
    }

    let Some(tags) = frame
        .get_mut(2)
        .and_then(|event| event.get_mut("tags"))
        .and_then(Value::as_array_mut)
    else {
        return 0;
    };

    let before = tags.len();
    tags.retain(|tag| {
        tag.as_array()
            .is_some_and(|values| !values.is_empty() && values.iter().all(Value::is_string))
    });

    before - tags.len()
}
