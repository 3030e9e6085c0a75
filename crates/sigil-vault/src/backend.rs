//! The vault backend seam.
//!
//! The OS secret service (keychain, keyring, TPM agent) provides a
//! keyed byte-blob store. Implementations report unavailability rather
//! than buffering writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Result, VaultError};

/// A keyed byte-blob store.
#[async_trait]
pub trait VaultBackend: Send + Sync {
    /// Fetch the blob stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, overwriting any previous blob.
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Delete the blob under `key`. Returns whether one existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// All keys currently stored.
    async fn list_keys(&self) -> Result<Vec<String>>;
}

/// In-memory backend for tests and first-run flows.
#[derive(Default)]
pub struct MemoryVault {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    offline: AtomicBool,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the vault agent going away; subsequent calls fail with
    /// [`VaultError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(VaultError::Unavailable("vault offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl VaultBackend for MemoryVault {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_online()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.check_online()?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_online()?;
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        self.check_online()?;
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let vault = MemoryVault::new();
        vault.put("a", b"blob").await.expect("put");
        assert_eq!(vault.get("a").await.expect("get"), Some(b"blob".to_vec()));
        assert!(vault.delete("a").await.expect("delete"));
        assert_eq!(vault.get("a").await.expect("get"), None);
        assert!(!vault.delete("a").await.expect("delete again"));
    }

    #[tokio::test]
    async fn test_list_keys_sorted() {
        let vault = MemoryVault::new();
        vault.put("b", b"2").await.expect("put");
        vault.put("a", b"1").await.expect("put");
        assert_eq!(vault.list_keys().await.expect("list"), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_offline_reports_unavailable() {
        let vault = MemoryVault::new();
        vault.set_offline(true);
        assert!(matches!(
            vault.get("a").await,
            Err(VaultError::Unavailable(_))
        ));
        vault.set_offline(false);
        assert!(vault.get("a").await.is_ok());
    }
}
