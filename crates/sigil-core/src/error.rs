//! The unified error taxonomy surfaced to callers.
//!
//! Exactly twelve kinds, no hierarchy. Per-crate errors carry the
//! fine-grained cause and flatten into these discriminants at this
//! boundary. Secret bytes never appear in any message.

use sigil_crypto::CryptoError;
use sigil_giftwrap::GiftWrapError;
use sigil_hsm::HsmError;
use sigil_media::MediaError;
use sigil_mls::MlsError;
use sigil_policy::PolicyError;
use sigil_types::TypesError;
use sigil_vault::VaultError;

/// Caller-facing error kinds.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Caller-side format errors: bad hex, bad npub, bad phrase.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A session was required but is not authenticated.
    #[error("session is locked")]
    Locked,

    /// Identity, delegation, group, or key package missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Add of an already-present id.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Decryption authentication failed / wrong passphrase.
    #[error("authentication failed")]
    AuthFail,

    /// Signature verification failed.
    #[error("signature verification failed")]
    SigFail,

    /// Delegation, session, or approval decision past its validity.
    #[error("expired")]
    Expired,

    /// The delegation has been revoked.
    #[error("revoked")]
    Revoked,

    /// Vault, relay, or HSM not reachable right now.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Transient I/O error; retryable.
    #[error("network error: {0}")]
    Network(String),

    /// The event parses but violates the protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The operation was cancelled before any durable effect.
    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<TypesError> for CoreError {
    fn from(e: TypesError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

impl From<CryptoError> for CoreError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::SignatureVerification => Self::SigFail,
            CryptoError::Authentication => Self::AuthFail,
            CryptoError::MalformedPayload(msg) => Self::ProtocolViolation(msg),
            CryptoError::KeyDerivation(msg) => Self::InvalidInput(msg),
            CryptoError::PlaintextSize(len) => {
                Self::InvalidInput(format!("plaintext length {len} out of range"))
            }
            CryptoError::InvalidInput(msg) => Self::InvalidInput(msg),
        }
    }
}

impl From<VaultError> for CoreError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::Unavailable(msg) => Self::BackendUnavailable(msg),
            VaultError::Timeout => Self::BackendUnavailable("vault timed out".to_string()),
            VaultError::Duplicate => Self::Duplicate("identity".to_string()),
            VaultError::NotFound => Self::NotFound("identity".to_string()),
            VaultError::InvalidInput(msg) => Self::InvalidInput(msg),
            VaultError::WrongPassphrase => Self::AuthFail,
            VaultError::EmptyPassphrase => Self::InvalidInput("empty passphrase".to_string()),
            VaultError::Kdf(msg) => Self::InvalidInput(msg),
        }
    }
}

impl From<PolicyError> for CoreError {
    fn from(e: PolicyError) -> Self {
        match e {
            PolicyError::NotFound => Self::NotFound("delegation".to_string()),
            PolicyError::InvalidInput(msg) => Self::InvalidInput(msg),
            PolicyError::Crypto(e) => e.into(),
            PolicyError::Storage(msg) => Self::BackendUnavailable(msg),
        }
    }
}

impl From<GiftWrapError> for CoreError {
    fn from(e: GiftWrapError) -> Self {
        match e {
            GiftWrapError::SigFail => Self::SigFail,
            GiftWrapError::AuthFail => Self::AuthFail,
            GiftWrapError::KindMismatch(kind) => {
                Self::ProtocolViolation(format!("unexpected kind {kind}"))
            }
            GiftWrapError::AuthorMismatch => {
                Self::ProtocolViolation("rumor author mismatch".to_string())
            }
            GiftWrapError::Malformed(msg) => Self::ProtocolViolation(msg),
            GiftWrapError::Crypto(e) => e.into(),
        }
    }
}

impl From<MlsError> for CoreError {
    fn from(e: MlsError) -> Self {
        match e {
            MlsError::GroupNotFound(id) => Self::NotFound(format!("group {id}")),
            MlsError::KeyPackageNotFound(pk) => Self::NotFound(format!("key package for {pk}")),
            MlsError::AlreadyInitialized => {
                Self::Duplicate("group database handle".to_string())
            }
            MlsError::Engine(msg) => Self::ProtocolViolation(msg),
            MlsError::Store(msg) => Self::BackendUnavailable(msg),
            MlsError::Protocol(msg) => Self::ProtocolViolation(msg),
            MlsError::Relay(msg) => Self::Network(msg),
            MlsError::Cancelled => Self::Cancelled,
            MlsError::GiftWrap(e) => e.into(),
            MlsError::Crypto(e) => e.into(),
        }
    }
}

impl From<MediaError> for CoreError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::Network(msg) => Self::Network(msg),
            MediaError::HashMismatch => Self::AuthFail,
            MediaError::UnknownEncoding(enc) => {
                Self::ProtocolViolation(format!("unknown media encoding {enc}"))
            }
            MediaError::InvalidInput(msg) => Self::InvalidInput(msg),
            MediaError::Cancelled => Self::Cancelled,
            MediaError::Mls(e) => e.into(),
        }
    }
}

impl From<HsmError> for CoreError {
    fn from(e: HsmError) -> Self {
        match e {
            HsmError::NotAvailable => Self::BackendUnavailable("hsm".to_string()),
            HsmError::PinRequired | HsmError::PinIncorrect => Self::AuthFail,
            HsmError::DeviceError(msg) => Self::BackendUnavailable(msg),
            HsmError::KeyNotFound(id) => Self::NotFound(format!("hsm key {id}")),
            HsmError::InvalidInput(msg) => Self::InvalidInput(msg),
            HsmError::DuplicateProvider(name) => Self::Duplicate(format!("provider {name}")),
        }
    }
}
