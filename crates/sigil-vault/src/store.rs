//! The secret store: durable identity → secret-key mapping.
//!
//! The store is the sole writer to the vault. Records are keyed by
//! npub; the stored blob is `secret(32) || label(utf8)`. Secret buffers
//! are zeroized after use and never appear in logs or errors.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tokio::time::timeout;
use zeroize::Zeroize;

use sigil_crypto::keys::SecretKey;
use sigil_types::encoding;
use sigil_types::identity::{IdentityEntry, IdentitySelector};

use crate::{Result, VaultBackend, VaultError, VAULT_TIMEOUT};

/// Vault keys for identities share this namespace prefix so session
/// state can live in the same vault without colliding.
const IDENTITY_PREFIX: &str = "identity/";

/// Durable, encrypted-at-rest mapping from identity to secret key.
pub struct SecretStore {
    backend: Arc<dyn VaultBackend>,
}

impl SecretStore {
    pub fn new(backend: Arc<dyn VaultBackend>) -> Self {
        Self { backend }
    }

    /// Store a new identity. The npub must match the secret's derived
    /// public key. Re-adding the same identity is a [`VaultError::Duplicate`],
    /// even with identical bytes.
    pub async fn add(&self, npub: &str, secret: &SecretKey, label: &str) -> Result<()> {
        let pubkey =
            encoding::npub_decode(npub).map_err(|e| VaultError::InvalidInput(e.to_string()))?;
        let derived = secret.public_key();
        // Constant-time match between claimed and derived key.
        if derived.as_bytes().ct_eq(&pubkey).unwrap_u8() != 1 {
            return Err(VaultError::InvalidInput(
                "npub does not match secret key".to_string(),
            ));
        }

        let key = vault_key(npub);
        if self.backend_get(&key).await?.is_some() {
            return Err(VaultError::Duplicate);
        }

        let mut blob = Vec::with_capacity(32 + label.len());
        blob.extend_from_slice(secret.as_bytes());
        blob.extend_from_slice(label.as_bytes());
        let result = self.backend_put(&key, &blob).await;
        blob.zeroize();
        result?;

        tracing::info!(fingerprint = %derived.fingerprint(), "identity added");
        Ok(())
    }

    /// Remove an identity.
    pub async fn remove(&self, selector: &str) -> Result<()> {
        let npub = self.resolve(selector).await?.ok_or(VaultError::NotFound)?;
        if !self.backend_delete(&vault_key(&npub)).await? {
            return Err(VaultError::NotFound);
        }
        tracing::info!("identity removed");
        Ok(())
    }

    /// Fetch the secret and label for an identity.
    pub async fn lookup(&self, selector: &str) -> Result<Option<(SecretKey, IdentityEntry)>> {
        let Some(npub) = self.resolve(selector).await? else {
            return Ok(None);
        };
        let Some(mut blob) = self.backend_get(&vault_key(&npub)).await? else {
            return Ok(None);
        };
        let parsed = parse_blob(&npub, &blob);
        blob.zeroize();
        parsed.map(Some)
    }

    /// List all stored identities (no secret material).
    pub async fn list(&self) -> Result<Vec<IdentityEntry>> {
        let mut entries = Vec::new();
        for key in self.backend_list().await? {
            let Some(npub) = key.strip_prefix(IDENTITY_PREFIX) else {
                continue;
            };
            let Some(mut blob) = self.backend_get(&key).await? else {
                continue;
            };
            let parsed = parse_blob(npub, &blob);
            blob.zeroize();
            let (_, entry) = parsed?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Replace an identity's display label.
    pub async fn set_label(&self, selector: &str, label: &str) -> Result<()> {
        let npub = self.resolve(selector).await?.ok_or(VaultError::NotFound)?;
        let key = vault_key(&npub);
        let Some(mut blob) = self.backend_get(&key).await? else {
            return Err(VaultError::NotFound);
        };
        if blob.len() < 32 {
            blob.zeroize();
            return Err(VaultError::InvalidInput("corrupt identity record".to_string()));
        }
        blob.truncate(32);
        blob.extend_from_slice(label.as_bytes());
        let result = self.backend_put(&key, &blob).await;
        blob.zeroize();
        result
    }

    /// Resolve a selector (npub, hex pubkey, or label) to a stored npub.
    async fn resolve(&self, selector: &str) -> Result<Option<String>> {
        match IdentitySelector::parse(selector) {
            IdentitySelector::Npub(npub) => Ok(Some(npub)),
            IdentitySelector::PubkeyHex(hex_key) => {
                let bytes = encoding::hex32(&hex_key)
                    .map_err(|e| VaultError::InvalidInput(e.to_string()))?;
                let npub = encoding::npub_encode(&bytes)
                    .map_err(|e| VaultError::InvalidInput(e.to_string()))?;
                Ok(Some(npub))
            }
            IdentitySelector::Label(label) => {
                for entry in self.list().await? {
                    if entry.label == label {
                        return Ok(Some(entry.npub));
                    }
                }
                Ok(None)
            }
        }
    }

    async fn backend_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        timeout(VAULT_TIMEOUT, self.backend.get(key))
            .await
            .map_err(|_| VaultError::Timeout)?
    }

    async fn backend_put(&self, key: &str, value: &[u8]) -> Result<()> {
        timeout(VAULT_TIMEOUT, self.backend.put(key, value))
            .await
            .map_err(|_| VaultError::Timeout)?
    }

    async fn backend_delete(&self, key: &str) -> Result<bool> {
        timeout(VAULT_TIMEOUT, self.backend.delete(key))
            .await
            .map_err(|_| VaultError::Timeout)?
    }

    async fn backend_list(&self) -> Result<Vec<String>> {
        timeout(VAULT_TIMEOUT, self.backend.list_keys())
            .await
            .map_err(|_| VaultError::Timeout)?
    }
}

fn vault_key(npub: &str) -> String {
    format!("{IDENTITY_PREFIX}{npub}")
}

fn parse_blob(npub: &str, blob: &[u8]) -> Result<(SecretKey, IdentityEntry)> {
    if blob.len() < 32 {
        return Err(VaultError::InvalidInput("corrupt identity record".to_string()));
    }
    let mut secret_bytes: [u8; 32] = blob[..32]
        .try_into()
        .map_err(|_| VaultError::InvalidInput("corrupt identity record".to_string()))?;
    let secret = SecretKey::from_bytes(&secret_bytes)
        .map_err(|e| VaultError::InvalidInput(e.to_string()));
    secret_bytes.zeroize();
    let secret = secret?;
    let label = String::from_utf8_lossy(&blob[32..]).into_owned();
    let fingerprint = secret.public_key().fingerprint();
    Ok((
        secret,
        IdentityEntry {
            npub: npub.to_string(),
            label,
            fingerprint,
        },
    ))
}
