use log::*;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use url::Url;

/// A relay as it may appear in the `relays` list of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayEntry {
    Host(String),
    Detailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        read: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        write: Option<bool>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
    pub url: Url,
    pub can_read: bool,
    pub can_write: bool,
}

impl RelayEndpoint {
    /// Canonical endpoint for one config entry. Bare hosts get the `wss://`
    /// scheme; entries without a url or with an unparseable one yield `None`.
    pub fn normalize(entry: &RelayEntry) -> Option<Self> {
        let (raw, can_read, can_write) = match entry {
            RelayEntry::Host(host) => (host.as_str(), true, true),
            RelayEntry::Detailed { url: Some(url), read, write } => {
                (url.as_str(), read.unwrap_or(true), write.unwrap_or(true))
            }
            RelayEntry::Detailed { url: None, .. } => return None,
        };

        let raw = raw.trim();
        let with_scheme = if raw.starts_with("wss://") || raw.starts_with("ws://") {
            raw.to_string()
        } else {
            format!("wss://{raw}")
        };

        match Url::parse(&with_scheme) {
            Ok(url) => Some(Self { url, can_read, can_write }),
            Err(e) => {
                warn!("Skipping relay {raw}: {e}");
                None
            }
        }
    }
}

/// Normalize every entry, keeping the first occurrence of each url.
pub fn relays_from_entries(entries: &[RelayEntry]) -> Vec<RelayEndpoint> {
    let mut relays: Vec<RelayEndpoint> = vec![];

    for endpoint in entries.iter().filter_map(RelayEndpoint::normalize) {
        if !relays.iter().any(|r| r.url == endpoint.url) {
            relays.push(endpoint);
        }
    }

    relays
}

/// Shuffled copy of `relays`, cut down to at most `max_count` entries.
pub fn pick_relays(relays: &[RelayEndpoint], max_count: usize) -> Vec<RelayEndpoint> {
    let mut picked = relays.to_vec();
    picked.shuffle(&mut rand::thread_rng());
    picked.truncate(max_count);
    picked
}

/// Url as written in configs and NIP-42 tags, without the root path slash.
pub fn display_url(url: &Url) -> &str {
    let s = url.as_str();
    if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
        s.strip_suffix('/').unwrap_or(s)
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(json: &str) -> Vec<RelayEntry> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn bare_host_and_secure_url_collapse() {
        let relays = relays_from_entries(&entries(
            r#"["relay.damus.io", "wss://relay.damus.io", {"url": "relay.damus.io/", "write": false}]"#,
        ));
        assert_eq!(relays.len(), 1);
        assert_eq!(display_url(&relays[0].url), "wss://relay.damus.io");
        assert!(relays[0].can_read && relays[0].can_write);
    }

    #[test]
    fn detailed_entries_keep_permissions() {
        let relays = relays_from_entries(&entries(
            r#"[{"url": "wss://a.example", "read": false}, {"read": true}, {"url": "b.example", "write": false}]"#,
        ));
        assert_eq!(relays.len(), 2);
        assert!(!relays[0].can_read && relays[0].can_write);
        assert!(relays[1].can_read && !relays[1].can_write);
        assert_eq!(relays[1].url.scheme(), "wss");
    }

    #[test]
    fn pick_relays_caps_count_without_duplicates() {
        let all = relays_from_entries(&entries(r#"["a.example", "b.example", "c.example", "d.example"]"#));
        let picked = pick_relays(&all, 3);
        assert_eq!(picked.len(), 3);
        for p in &picked {
            assert_eq!(picked.iter().filter(|o| o.url == p.url).count(), 1);
            assert!(all.contains(p));
        }
        assert_eq!(pick_relays(&all, 10).len(), 4);
    }

    #[test]
    fn display_url_keeps_paths() {
        let url = Url::parse("wss://relay.example.com/inbox").unwrap();
        assert_eq!(display_url(&url), "wss://relay.example.com/inbox");
    }
}
