//! # sigil-media
//!
//! MIP-04 encrypted media: encrypt under the group's epoch secret,
//! upload the ciphertext to a blob server, and hand out an `imeta` tag
//! that lets other members download and decrypt. The blob server never
//! sees plaintext or keys.

pub mod blob;
pub mod engine;

pub use blob::BlobClient;
pub use engine::MediaEngine;

/// Error types for the media pipeline.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// HTTP failure talking to the blob server; retryable.
    #[error("blob transfer failed: {0}")]
    Network(String),

    /// Downloaded bytes do not hash to the imeta `x` value.
    #[error("ciphertext hash mismatch")]
    HashMismatch,

    /// The imeta `encoding` value is not understood; fail closed.
    #[error("unknown media encoding: {0}")]
    UnknownEncoding(String),

    /// Malformed imeta tag or URL.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The caller cancelled the transfer.
    #[error("cancelled")]
    Cancelled,

    /// Group-layer failure (unknown group, engine error).
    #[error(transparent)]
    Mls(#[from] sigil_mls::MlsError),
}

pub type Result<T> = std::result::Result<T, MediaError>;
