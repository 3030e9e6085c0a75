//! The external-signer provider trait.

use async_trait::async_trait;

use crate::Result;

/// A signing device (or software equivalent) a provider can talk to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
}

/// A key held by a provider. Secret material never crosses this type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HsmKeyInfo {
    pub id: String,
    pub label: String,
    /// X-only public key, lowercase hex.
    pub pubkey_hex: String,
}

/// An external signer backend.
#[async_trait]
pub trait HsmProvider: Send + Sync {
    /// Enumerate reachable devices.
    async fn detect_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Keys available for signing.
    async fn list_keys(&self) -> Result<Vec<HsmKeyInfo>>;

    /// The public key for one key id.
    async fn get_public_key(&self, key_id: &str) -> Result<String>;

    /// BIP-340 Schnorr signature over a 32-byte hash.
    async fn sign_hash(&self, key_id: &str, hash: &[u8; 32]) -> Result<[u8; 64]>;

    /// Sign a full event template (JSON); returns the signed event JSON.
    async fn sign_event(&self, key_id: &str, template_json: &str) -> Result<String>;

    /// Create a new key; returns its info.
    async fn generate_key(&self, label: &str) -> Result<HsmKeyInfo>;

    /// Import existing secret material (hex or nsec).
    async fn import_key(&self, secret: &str, label: &str) -> Result<HsmKeyInfo>;

    /// Destroy a key.
    async fn delete_key(&self, key_id: &str) -> Result<()>;

    /// Unlock the provider with a PIN.
    async fn login(&self, pin: &str) -> Result<()>;

    /// Lock the provider again.
    async fn logout(&self) -> Result<()>;
}
