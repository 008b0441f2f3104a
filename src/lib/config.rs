//! Config and calendar definition files.
//!
//! Both are JSON. Keys this program does not know about are carried through
//! untouched when a file is rewritten.

use anyhow::{Context, Result};
use log::*;
use nostr::Keys;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::calendar::matcher::SearchCriterion;
use crate::nostr::client::Timing;
use crate::nostr::endpoint::{self, RelayEndpoint, RelayEntry};
use crate::nostr::keys;

pub const DEFAULT_MAX_RELAYS: usize = 50;
const NSEC_LEN: usize = 63;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub relays: Vec<RelayEntry>,
    #[serde(default)]
    pub nsec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_relays: Option<usize>,
    /// Seconds to wait after opening connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_connect_time: Option<f64>,
    /// Seconds to wait after each request before reading replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_publish_time: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        load_json_file(path).with_context(|| format!("Config file {} is empty or not json", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json_file(path, self)
    }

    pub fn relays(&self) -> Vec<RelayEndpoint> {
        endpoint::relays_from_entries(&self.relays)
    }

    pub fn max_relays(&self) -> usize {
        self.max_relays.unwrap_or(DEFAULT_MAX_RELAYS)
    }

    pub fn timing(&self) -> Timing {
        let defaults = Timing::default();

        Timing {
            connect_settle: seconds(self.relay_connect_time).unwrap_or(defaults.connect_settle),
            publish_settle: seconds(self.relay_publish_time).unwrap_or(defaults.publish_settle),
        }
    }

    /// Keys for the configured identity. A short or undecodable `nsec` is
    /// replaced by a freshly generated one; the flag reports the replacement.
    pub fn ensure_identity(&mut self) -> Result<(Keys, bool)> {
        if self.nsec.len() >= NSEC_LEN {
            match keys::parse_secret(&self.nsec) {
                Ok(parsed) => return Ok((parsed, false)),
                Err(e) => warn!("nsec could not be decoded ({e}), creating new one"),
            }
        } else {
            warn!("nsec length less than {NSEC_LEN}, creating new one");
        }

        let generated = Keys::generate();
        self.nsec = keys::nsec(&generated)?;
        Ok((generated, true))
    }
}

fn seconds(value: Option<f64>) -> Option<Duration> {
    value.and_then(|s| Duration::try_from_secs_f64(s).ok())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarDefinition {
    #[serde(default)]
    pub uuid: String,
    /// Seconds between passes. Zero or less runs a single pass.
    pub frequency: i64,
    pub searchlist: Vec<SearchCriterion>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub content: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CalendarDefinition {
    pub fn load(path: &Path) -> Result<Self> {
        load_json_file(path).with_context(|| format!("Calendar file {} is empty or not json", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json_file(path, self)
    }

    /// Give the calendar a uuid if it has none. Returns whether one was made.
    pub fn ensure_uuid(&mut self) -> bool {
        if !self.uuid.is_empty() {
            return false;
        }
        self.uuid = uuid::Uuid::new_v4().to_string();
        true
    }

    pub fn interval(&self) -> Option<Duration> {
        u64::try_from(self.frequency).ok().filter(|s| *s > 0).map(Duration::from_secs)
    }
}

pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(serde_json::from_str(&data)?)
}

/// Write `value` beside `path` first, then rename it over `path`.
pub fn save_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, serde_json::to_string_pretty(value)?).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
