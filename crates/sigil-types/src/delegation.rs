//! NIP-26 delegation records.
//!
//! The `conditions` string is the canonical concatenation
//! `kind=K(&kind=K)*&created_at>F&created_at<U`, with absent fields
//! omitted entirely and no trailing separator.

use serde::{Deserialize, Serialize};

/// A stored delegation, persisted per delegator as a JSON array element.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// Local identifier (random hex).
    pub id: String,
    /// The delegator identity this record belongs to.
    pub delegator_npub: String,
    /// The delegatee's x-only public key, lowercase hex.
    pub delegatee_pubkey_hex: String,
    /// Kinds the delegatee may sign, in insertion order. `None` = any kind.
    pub allowed_kinds: Option<Vec<u16>>,
    /// Validity window start (unix seconds), 0 = unbounded.
    pub valid_from: u64,
    /// Validity window end (unix seconds), 0 = unbounded.
    pub valid_until: u64,
    /// Canonical NIP-26 conditions string.
    pub conditions: String,
    /// Schnorr signature over the delegation token, lowercase hex.
    pub signature: String,
    /// When the delegation was issued (unix seconds).
    pub created_at: u64,
    /// Local-only revocation flag.
    pub revoked: bool,
    /// When the delegation was revoked, 0 if never.
    pub revoked_at: u64,
    /// Optional user label.
    pub label: Option<String>,
}

/// Build the canonical conditions string.
///
/// Field order is fixed: `kind=` entries in insertion order, then
/// `created_at>`, then `created_at<`. A zero bound means the field is
/// absent.
pub fn build_conditions(allowed_kinds: Option<&[u16]>, valid_from: u64, valid_until: u64) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(kinds) = allowed_kinds {
        for kind in kinds {
            parts.push(format!("kind={kind}"));
        }
    }
    if valid_from != 0 {
        parts.push(format!("created_at>{valid_from}"));
    }
    if valid_until != 0 {
        parts.push(format!("created_at<{valid_until}"));
    }
    parts.join("&")
}

/// Parsed form of a conditions string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Conditions {
    /// `kind=` entries in the order they appeared. Empty = any kind.
    pub kinds: Vec<u16>,
    /// `created_at>` bound, 0 if absent.
    pub valid_from: u64,
    /// `created_at<` bound, 0 if absent.
    pub valid_until: u64,
}

/// Parse a conditions string back into its fields. Unknown condition
/// fields are rejected; an empty string parses to the unrestricted
/// [`Conditions`].
pub fn parse_conditions(conditions: &str) -> crate::Result<Conditions> {
    let mut parsed = Conditions::default();
    if conditions.is_empty() {
        return Ok(parsed);
    }
    for field in conditions.split('&') {
        if let Some(kind) = field.strip_prefix("kind=") {
            let kind = kind.parse::<u16>().map_err(|_| {
                crate::TypesError::InvalidFormat(format!("bad kind condition: {field}"))
            })?;
            parsed.kinds.push(kind);
        } else if let Some(from) = field.strip_prefix("created_at>") {
            parsed.valid_from = from.parse::<u64>().map_err(|_| {
                crate::TypesError::InvalidFormat(format!("bad time condition: {field}"))
            })?;
        } else if let Some(until) = field.strip_prefix("created_at<") {
            parsed.valid_until = until.parse::<u64>().map_err(|_| {
                crate::TypesError::InvalidFormat(format!("bad time condition: {field}"))
            })?;
        } else {
            return Err(crate::TypesError::InvalidFormat(format!(
                "unknown condition field: {field}"
            )));
        }
    }
    Ok(parsed)
}

impl Delegation {
    /// The `["delegation", delegator_hex, conditions, sig]` tag emitted
    /// into delegated events.
    pub fn to_tag(&self, delegator_pubkey_hex: &str) -> Vec<String> {
        vec![
            "delegation".to_string(),
            delegator_pubkey_hex.to_string(),
            self.conditions.clone(),
            self.signature.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditions_full() {
        let s = build_conditions(Some(&[1, 7]), 1_700_000_000, 1_800_000_000);
        assert_eq!(s, "kind=1&kind=7&created_at>1700000000&created_at<1800000000");
    }

    #[test]
    fn test_conditions_kinds_only() {
        assert_eq!(build_conditions(Some(&[30023]), 0, 0), "kind=30023");
    }

    #[test]
    fn test_conditions_time_only() {
        assert_eq!(
            build_conditions(None, 1_700_000_000, 0),
            "created_at>1700000000"
        );
        assert_eq!(
            build_conditions(None, 0, 1_800_000_000),
            "created_at<1800000000"
        );
    }

    #[test]
    fn test_conditions_empty() {
        assert_eq!(build_conditions(None, 0, 0), "");
    }

    #[test]
    fn test_conditions_preserve_insertion_order() {
        let s = build_conditions(Some(&[7, 1, 30023]), 0, 0);
        assert_eq!(s, "kind=7&kind=1&kind=30023");
    }

    #[test]
    fn test_parse_roundtrip() {
        let s = build_conditions(Some(&[7, 1]), 1_700_000_000, 1_800_000_000);
        let parsed = parse_conditions(&s).expect("parse");
        assert_eq!(parsed.kinds, vec![7, 1]);
        assert_eq!(parsed.valid_from, 1_700_000_000);
        assert_eq!(parsed.valid_until, 1_800_000_000);
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse_conditions("").expect("parse"), Conditions::default());
    }

    #[test]
    fn test_parse_rejects_unknown_field() {
        assert!(parse_conditions("kind=1&expires=5").is_err());
        assert!(parse_conditions("kind=abc").is_err());
    }

    #[test]
    fn test_no_trailing_separator() {
        for s in [
            build_conditions(Some(&[1]), 0, 0),
            build_conditions(Some(&[1]), 1, 0),
            build_conditions(None, 1, 2),
        ] {
            assert!(!s.ends_with('&'));
            assert!(!s.starts_with('&'));
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_conditions_well_formed(
            kinds in proptest::option::of(proptest::collection::vec(0u16..1000, 0..6)),
            from in 0u64..2_000_000_000,
            until in 0u64..2_000_000_000,
        ) {
            let s = build_conditions(kinds.as_deref(), from, until);

            proptest::prop_assert!(!s.ends_with('&'));
            proptest::prop_assert!(s.matches("created_at>").count() <= 1);
            proptest::prop_assert!(s.matches("created_at<").count() <= 1);

            // Kinds appear in insertion order.
            let listed: Vec<u16> = s
                .split('&')
                .filter_map(|f| f.strip_prefix("kind="))
                .filter_map(|k| k.parse().ok())
                .collect();
            proptest::prop_assert_eq!(listed, kinds.unwrap_or_default());

            // And the string parses back to the same bounds.
            let parsed = parse_conditions(&s).expect("emitted strings always parse");
            proptest::prop_assert_eq!(parsed.valid_from, from);
            proptest::prop_assert_eq!(parsed.valid_until, until);
        }
    }
}
