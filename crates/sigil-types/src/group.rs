//! The local view of an MLS group.

use serde::{Deserialize, Serialize};

/// Group membership status as seen locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// We hold current state and can send/receive.
    Active,
    /// We left or were removed.
    Inactive,
    /// A welcome was received but not yet processed to completion.
    Pending,
}

/// The locally stored view of an MLS group. Mutated only by commit and
/// welcome processing, never by UI code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Opaque MLS group id, lowercase hex.
    pub mls_group_id: String,
    pub name: String,
    pub description: String,
    /// Epoch of the most recently processed commit.
    pub epoch: u64,
    pub status: GroupStatus,
    /// Admin x-only public keys, lowercase hex.
    pub admin_pubkeys: Vec<String>,
    /// Relays this group's messages are published to.
    pub relay_urls: Vec<String>,
}

/// Prefix of the canonical direct-message group name.
pub const DM_NAME_PREFIX: &str = "dm:";

/// Canonical name for the two-person DM group between `a` and `b`
/// (x-only pubkeys, lowercase hex). Symmetric in its arguments.
pub fn dm_name(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{DM_NAME_PREFIX}{lo}+{hi}")
}

impl GroupInfo {
    /// Whether this group is a canonical direct-message group.
    pub fn is_dm(&self) -> bool {
        self.name.starts_with(DM_NAME_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dm_name_symmetric() {
        let a = "aa".repeat(32);
        let b = "bb".repeat(32);
        assert_eq!(dm_name(&a, &b), dm_name(&b, &a));
        assert!(dm_name(&a, &b).starts_with("dm:"));
    }

    #[test]
    fn test_dm_name_orders_lexicographically() {
        let name = dm_name("ffff", "0000");
        assert_eq!(name, "dm:0000+ffff");
    }

    #[test]
    fn test_dm_name_same_key_both_sides() {
        // Self-DM degenerates to min == max.
        let a = "ab".repeat(32);
        assert_eq!(dm_name(&a, &a), format!("dm:{a}+{a}"));
    }

    #[test]
    fn test_is_dm() {
        let mut group = GroupInfo {
            mls_group_id: "00".repeat(32),
            name: dm_name("aa", "bb"),
            description: String::new(),
            epoch: 0,
            status: GroupStatus::Active,
            admin_pubkeys: vec![],
            relay_urls: vec![],
        };
        assert!(group.is_dm());
        group.name = "team chat".to_string();
        assert!(!group.is_dm());
    }
}
