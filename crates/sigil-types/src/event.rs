//! The Nostr event model.
//!
//! An [`Event`] is the signed wire form; an [`EventTemplate`] is the
//! unsigned six-tuple precursor (also used for NIP-59 rumors, which are
//! never signed).

use serde::{Deserialize, Serialize};

use crate::{Result, TypesError};

/// A signed Nostr event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Lowercase hex sha256 of the canonical serialization.
    pub id: String,
    /// Author x-only public key, lowercase hex.
    pub pubkey: String,
    /// Unix timestamp in seconds.
    pub created_at: u64,
    /// Event kind.
    pub kind: u16,
    /// Tags: an array of arrays of strings.
    pub tags: Vec<Vec<String>>,
    /// Arbitrary content, interpretation depends on kind.
    pub content: String,
    /// BIP-340 Schnorr signature over `id`, lowercase hex.
    pub sig: String,
}

/// An unsigned event: everything an author fixes before id computation.
///
/// NIP-59 rumors are templates carried with a precomputed `pubkey`; they
/// stay unsigned by design.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTemplate {
    /// Author x-only public key, lowercase hex.
    pub pubkey: String,
    /// Unix timestamp in seconds.
    pub created_at: u64,
    /// Event kind.
    pub kind: u16,
    /// Tags: an array of arrays of strings.
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    /// Arbitrary content.
    #[serde(default)]
    pub content: String,
}

impl Event {
    /// Parse an event from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TypesError::InvalidFormat(e.to_string()))
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// First value of the first tag whose name matches, e.g. `tag_value("p")`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }

    /// All values of tags with the given name.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.tags
            .iter()
            .filter(move |t| t.first().map(String::as_str) == Some(name))
            .filter_map(|t| t.get(1))
            .map(String::as_str)
    }

    /// The unsigned template this event was built from.
    pub fn template(&self) -> EventTemplate {
        EventTemplate {
            pubkey: self.pubkey.clone(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags.clone(),
            content: self.content.clone(),
        }
    }
}

impl EventTemplate {
    /// Parse a template (or rumor) from JSON. Extra fields such as a
    /// precomputed `id` are ignored.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TypesError::InvalidFormat(e.to_string()))
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
