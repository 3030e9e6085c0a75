//! Software provider: keys held in process memory.
//!
//! The default provider on platforms without a hardware signer. No PIN
//! is enforced; `login` always succeeds.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use sigil_crypto::event as event_codec;
use sigil_crypto::keys::{Keypair, SecretKey};
use sigil_types::EventTemplate;

use crate::provider::{DeviceInfo, HsmKeyInfo, HsmProvider};
use crate::{HsmError, Result};

/// In-process software signer.
#[derive(Default)]
pub struct LocalProvider {
    keys: Mutex<Vec<(HsmKeyInfo, SecretKey)>>,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_key<T>(&self, key_id: &str, f: impl FnOnce(&SecretKey) -> Result<T>) -> Result<T> {
        let keys = self.lock();
        let (_, secret) = keys
            .iter()
            .find(|(info, _)| info.id == key_id)
            .ok_or_else(|| HsmError::KeyNotFound(key_id.to_string()))?;
        f(secret)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(HsmKeyInfo, SecretKey)>> {
        match self.keys.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn insert(&self, secret: SecretKey, label: &str) -> HsmKeyInfo {
        let public = secret.public_key();
        let info = HsmKeyInfo {
            id: public.fingerprint(),
            label: label.to_string(),
            pubkey_hex: public.to_hex(),
        };
        self.lock().push((info.clone(), secret));
        info
    }
}

#[async_trait]
impl HsmProvider for LocalProvider {
    async fn detect_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(vec![DeviceInfo {
            id: "local".to_string(),
            label: "Software keys".to_string(),
        }])
    }

    async fn list_keys(&self) -> Result<Vec<HsmKeyInfo>> {
        Ok(self.lock().iter().map(|(info, _)| info.clone()).collect())
    }

    async fn get_public_key(&self, key_id: &str) -> Result<String> {
        self.with_key(key_id, |secret| Ok(secret.public_key().to_hex()))
    }

    async fn sign_hash(&self, key_id: &str, hash: &[u8; 32]) -> Result<[u8; 64]> {
        self.with_key(key_id, |secret| {
            event_codec::sign_id(secret, hash).map_err(|e| HsmError::DeviceError(e.to_string()))
        })
    }

    async fn sign_event(&self, key_id: &str, template_json: &str) -> Result<String> {
        let template = EventTemplate::from_json(template_json)
            .map_err(|e| HsmError::InvalidInput(e.to_string()))?;
        self.with_key(key_id, |secret| {
            let event = event_codec::finalize(&template, secret)
                .map_err(|e| HsmError::DeviceError(e.to_string()))?;
            Ok(event.to_json())
        })
    }

    async fn generate_key(&self, label: &str) -> Result<HsmKeyInfo> {
        let keypair = Keypair::generate();
        Ok(self.insert(keypair.secret, label))
    }

    async fn import_key(&self, secret: &str, label: &str) -> Result<HsmKeyInfo> {
        let secret =
            SecretKey::parse(secret).map_err(|e| HsmError::InvalidInput(e.to_string()))?;
        Ok(self.insert(secret, label))
    }

    async fn delete_key(&self, key_id: &str) -> Result<()> {
        let mut keys = self.lock();
        let before = keys.len();
        keys.retain(|(info, _)| info.id != key_id);
        if keys.len() == before {
            return Err(HsmError::KeyNotFound(key_id.to_string()));
        }
        Ok(())
    }

    async fn login(&self, _pin: &str) -> Result<()> {
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        Ok(())
    }
}
