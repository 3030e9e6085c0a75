//! Identity records owned by the secret store.

use serde::{Deserialize, Serialize};

/// Public listing entry for a stored identity. Never carries secret bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEntry {
    /// Bech32 public key, the store's primary key.
    pub npub: String,
    /// User-chosen display label.
    pub label: String,
    /// First 8 hex chars of the public key.
    pub fingerprint: String,
}

/// Selector for identity lookups: an npub, a hex pubkey, or a label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentitySelector {
    Npub(String),
    PubkeyHex(String),
    Label(String),
}

impl IdentitySelector {
    /// Classify a free-form selector string.
    pub fn parse(s: &str) -> Self {
        if s.starts_with("npub1") {
            Self::Npub(s.to_string())
        } else if s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Self::PubkeyHex(s.to_lowercase())
        } else {
            Self::Label(s.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_classification() {
        assert!(matches!(
            IdentitySelector::parse("npub1qqqq"),
            IdentitySelector::Npub(_)
        ));
        assert!(matches!(
            IdentitySelector::parse(&"a".repeat(64)),
            IdentitySelector::PubkeyHex(_)
        ));
        assert!(matches!(
            IdentitySelector::parse("work key"),
            IdentitySelector::Label(_)
        ));
    }

    #[test]
    fn test_hex_selector_lowercased() {
        let upper = "A".repeat(64);
        assert_eq!(
            IdentitySelector::parse(&upper),
            IdentitySelector::PubkeyHex("a".repeat(64))
        );
    }
}
