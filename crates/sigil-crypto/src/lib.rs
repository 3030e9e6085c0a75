//! # sigil-crypto
//!
//! Cryptographic core for the sigil signer: canonical Nostr event
//! hashing and BIP-340 Schnorr signatures, NIP-44 v2 encrypted
//! payloads, NIP-49 passphrase-encrypted key backup, NIP-06 mnemonic
//! derivation, and the legacy NIP-04 cipher (decrypt only).
//!
//! The cryptographic suite is fixed; no algorithm negotiation exists
//! anywhere in the protocol.
//!
//! ## Modules
//!
//! - [`keys`] — secp256k1 keypairs with x-only public keys
//! - [`event`] — canonical event serialization, id, sign/verify
//! - [`nip44`] — conversation keys and authenticated payload encryption
//! - [`nip49`] — `ncryptsec` backup format (scrypt + XChaCha20-Poly1305)
//! - [`nip06`] — BIP-39 mnemonic validation and key derivation
//! - [`nip04`] — legacy AES-256-CBC direct-message decryption

pub mod event;
pub mod keys;
pub mod nip04;
pub mod nip06;
pub mod nip44;
pub mod nip49;

/// Error types for cryptographic operations.
///
/// Secret bytes and passphrases never appear in any variant's display
/// output.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Schnorr signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Authentication failed: MAC/tag mismatch or wrong passphrase.
    #[error("authentication failed")]
    Authentication,

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Payload parses but violates the format (bad version, bad length,
    /// bad padding).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Plaintext outside the allowed size range.
    #[error("plaintext length {0} out of range")]
    PlaintextSize(usize),

    /// Invalid key, phrase, or other caller-side input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
