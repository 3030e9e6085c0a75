//! # sigil-policy
//!
//! Authorization policy for the signer: NIP-26 delegations (issue,
//! validate, revoke) and the per-application approval cache that
//! remembers the user's allow/deny choices with a TTL.

pub mod approval;
pub mod delegation;

pub use approval::{ApprovalPolicy, AskOutcome};
pub use delegation::{verify_delegation_tag, DelegationEngine};

/// Error types for policy operations.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Delegation or approval record not found.
    #[error("not found")]
    NotFound,

    /// Malformed npub, hex key, or stored file.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Signing or signature verification failed.
    #[error(transparent)]
    Crypto(#[from] sigil_crypto::CryptoError),

    /// Persistence failed.
    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, PolicyError>;
