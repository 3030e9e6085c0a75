//! # sigil-vault
//!
//! Secret-key custody: the [`SecretStore`] maps identities to secret
//! keys through a pluggable OS-vault backend, and the
//! [`SessionManager`] gates every signing operation behind a
//! lock/unlock state with passphrase verification and idle timeout.
//!
//! The OS vault itself is an external collaborator; it appears here
//! only as the [`VaultBackend`] trait over keyed byte blobs.

pub mod backend;
pub mod session;
pub mod store;

pub use backend::{MemoryVault, VaultBackend};
pub use session::{LockReason, SessionEvent, SessionManager, SessionState};
pub use store::SecretStore;

/// Hard timeout on vault calls; a slow vault indicates a broken agent.
pub const VAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// Error types for custody operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The vault backend is not reachable right now.
    #[error("vault backend unavailable: {0}")]
    Unavailable(String),

    /// The vault did not answer within [`VAULT_TIMEOUT`].
    #[error("vault backend timed out")]
    Timeout,

    /// An identity with this key already exists.
    #[error("identity already stored")]
    Duplicate,

    /// No identity matches the selector.
    #[error("identity not found")]
    NotFound,

    /// Malformed npub, secret, or stored record.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Wrong passphrase (authenticate or set_password current check).
    #[error("wrong passphrase")]
    WrongPassphrase,

    /// A new passphrase must not be empty.
    #[error("empty passphrase")]
    EmptyPassphrase,

    /// Passphrase hashing failed.
    #[error("key derivation failed: {0}")]
    Kdf(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;
