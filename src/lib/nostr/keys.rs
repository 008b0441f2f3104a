use nostr::nips::nip19::ToBech32;
use nostr::{Event, EventBuilder, Keys, Kind, PublicKey, Tag, TagKind};
use thiserror::Error;
use url::Url;

use crate::nostr::endpoint;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key: {0}")]
    Secret(String),

    #[error("bech32 encoding failed: {0}")]
    Bech32(String),

    #[error("signing failed: {0}")]
    Sign(String),
}

/// Anything able to stamp an identity onto an event and sign it.
pub trait Signer {
    fn public_key(&self) -> PublicKey;

    fn sign(&self, builder: EventBuilder) -> Result<Event, KeyError>;
}

impl Signer for Keys {
    fn public_key(&self) -> PublicKey {
        Keys::public_key(self)
    }

    fn sign(&self, builder: EventBuilder) -> Result<Event, KeyError> {
        builder.sign_with_keys(self).map_err(|e| KeyError::Sign(e.to_string()))
    }
}

/// Parse a secret given either as `nsec1…` bech32 or as 64 hex chars.
///
/// Bech32 is case-insensitive, so an upper-case `NSEC1…` is accepted too.
pub fn parse_secret(secret: &str) -> Result<Keys, KeyError> {
    Keys::parse(&secret.trim().to_lowercase()).map_err(|e| KeyError::Secret(e.to_string()))
}

pub fn nsec(keys: &Keys) -> Result<String, KeyError> {
    keys.secret_key().to_bech32().map_err(|e| KeyError::Bech32(e.to_string()))
}

/// Tag with an arbitrary name, e.g. `["p", pubkey, "", "Maintainer"]`.
pub fn custom_tag<I, S>(name: &str, values: I) -> Tag
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Tag::custom(TagKind::Custom(name.to_string().into()), values)
}

/// NIP-42 response to a relay challenge, ready for signing.
pub fn auth_builder(challenge: &str, relay_url: &Url) -> EventBuilder {
    EventBuilder::new(Kind::Authentication, "").tags([
        custom_tag("relay", [endpoint::display_url(relay_url)]),
        custom_tag("challenge", [challenge]),
    ])
}
