//! # sigil-giftwrap
//!
//! NIP-59 gift wrapping: double-layered sealing of an unsigned rumor.
//!
//! The sender signs a kind-13 seal whose content is the NIP-44
//! encryption of the rumor, then an ephemeral key signs a kind-1059
//! wrap whose content is the NIP-44 encryption of the seal. The
//! ephemeral key exists for exactly one wrap; only the recipient can
//! open either layer.
//!
//! Failure kinds are distinct so the event router can tell "not for
//! me" from tampering.

pub mod wrap;

pub use wrap::{unwrap, wrap_rumor, Unwrapped};

/// Error types for gift-wrap processing.
#[derive(Debug, thiserror::Error)]
pub enum GiftWrapError {
    /// Outer wrap or inner seal signature did not verify.
    #[error("signature verification failed")]
    SigFail,

    /// NIP-44 authentication failed: the layer is not addressed to this
    /// recipient (or was tampered with in transit).
    #[error("decryption authentication failed")]
    AuthFail,

    /// The inner event is not a kind-13 seal.
    #[error("expected seal kind 13, got {0}")]
    KindMismatch(u16),

    /// The rumor's author does not match the seal's author.
    #[error("rumor author does not match seal author")]
    AuthorMismatch,

    /// Structurally invalid wrap, seal, or rumor.
    #[error("malformed gift wrap: {0}")]
    Malformed(String),

    /// Key or encryption failure while composing.
    #[error(transparent)]
    Crypto(#[from] sigil_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, GiftWrapError>;
