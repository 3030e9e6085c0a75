//! # sigil-types
//!
//! Shared domain types used across the sigil workspace: the Nostr event
//! model, bech32 entity encoding, and the records owned by the secret
//! store, delegation engine, approval policy, and group engine.

pub mod approval;
pub mod delegation;
pub mod encoding;
pub mod event;
pub mod group;
pub mod identity;
pub mod imeta;

pub use event::{Event, EventTemplate};

/// Event kinds handled by the core.
pub mod kind {
    /// Profile metadata.
    pub const METADATA: u16 = 0;
    /// Legacy NIP-04 encrypted direct message.
    pub const LEGACY_DM: u16 = 4;
    /// NIP-59 seal.
    pub const SEAL: u16 = 13;
    /// MLS key package.
    pub const KEY_PACKAGE: u16 = 443;
    /// MLS welcome (delivered gift-wrapped).
    pub const WELCOME: u16 = 444;
    /// MLS group message (application or commit).
    pub const GROUP_MESSAGE: u16 = 445;
    /// NIP-59 gift wrap.
    pub const GIFT_WRAP: u16 = 1059;
    /// NIP-41 key migration announcement.
    pub const KEY_MIGRATION: u16 = 1776;
    /// Key-package relay list.
    pub const KEY_PACKAGE_RELAYS: u16 = 10051;
}

/// Error types for parsing and encoding domain types.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// Malformed hex string.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Malformed bech32 entity.
    #[error("invalid bech32: {0}")]
    InvalidBech32(String),

    /// Wrong length for a fixed-size field.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Structurally invalid value (bad JSON shape, missing field).
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, TypesError>;
