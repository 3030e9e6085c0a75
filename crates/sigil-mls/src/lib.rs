//! # sigil-mls
//!
//! The MLS group layer: a thin adapter over the external MLS library,
//! the durable local group view, key-package lifecycle, and canonical
//! direct-message groups.
//!
//! The MLS algebra itself (RFC 9420 tree math, commit processing) is an
//! external collaborator behind the [`MlsEngine`] trait; this crate
//! never re-implements it. What lives here is everything around it:
//! per-group processing order, epoch bookkeeping, persistence, and the
//! Nostr event kinds (443/444/445/10051) that carry MLS payloads.
//!
//! ## Modules
//!
//! - [`engine`] — the `MlsEngine` collaborator trait and its data types
//! - [`adapter`] — [`GroupEngineAdapter`]: serialization + local view
//! - [`store`] — SQLite-backed group and message store
//! - [`keypackage`] — kind-443 publication, rotation, relay lists
//! - [`dm`] — canonical two-person DM groups
//! - [`relay`] — the relay collaborator trait
//! - [`testing`] — deterministic in-process doubles for tests

pub mod adapter;
pub mod dm;
pub mod engine;
pub mod keypackage;
pub mod relay;
pub mod store;
pub mod testing;

pub use adapter::{GroupEngineAdapter, Processed};
pub use dm::DmManager;
pub use engine::{EngineGroup, EngineMessage, MediaCiphertext, MlsEngine};
pub use keypackage::KeyPackageManager;
pub use relay::RelayClient;

/// Error types for the group layer.
#[derive(Debug, thiserror::Error)]
pub enum MlsError {
    /// Group not found locally.
    #[error("group not found: {0}")]
    GroupNotFound(String),

    /// No key package could be found for a peer.
    #[error("no key package for {0}")]
    KeyPackageNotFound(String),

    /// The group database is already open in this process.
    #[error("group database already initialized")]
    AlreadyInitialized,

    /// The MLS library rejected the operation.
    #[error("engine error: {0}")]
    Engine(String),

    /// SQLite failure in the group store.
    #[error("store error: {0}")]
    Store(String),

    /// Event parses but violates the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Relay publish or fetch failed.
    #[error("relay error: {0}")]
    Relay(String),

    /// The operation was cancelled before any durable effect.
    #[error("cancelled")]
    Cancelled,

    /// Gift-wrap failure while delivering a welcome.
    #[error(transparent)]
    GiftWrap(#[from] sigil_giftwrap::GiftWrapError),

    /// Key or signature failure.
    #[error(transparent)]
    Crypto(#[from] sigil_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, MlsError>;
