//! # sigil-hsm
//!
//! Pluggable external signers. A provider wraps a key backend (local
//! software keys, a mock device, some day PKCS#11) behind one async
//! surface: enumerate devices and keys, sign hashes and events, and
//! run the PIN login flow. Providers register by name in an
//! insertion-ordered registry.

pub mod local;
pub mod mock;
pub mod provider;
pub mod registry;

pub use local::LocalProvider;
pub use mock::MockProvider;
pub use provider::{DeviceInfo, HsmKeyInfo, HsmProvider};
pub use registry::ProviderRegistry;

/// Error types for external-signer operations.
#[derive(Debug, thiserror::Error)]
pub enum HsmError {
    /// The provider or device is not reachable.
    #[error("provider not available")]
    NotAvailable,

    /// The operation requires a successful `login(pin)` first.
    #[error("PIN required")]
    PinRequired,

    /// The supplied PIN was wrong.
    #[error("PIN incorrect")]
    PinIncorrect,

    /// The device rejected the operation.
    #[error("device error: {0}")]
    DeviceError(String),

    /// No key with this id.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Malformed key material or event template.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A provider with this name is already registered.
    #[error("provider already registered: {0}")]
    DuplicateProvider(String),
}

pub type Result<T> = std::result::Result<T, HsmError>;
