//! Mock provider with a scripted PIN flow, for exercising callers'
//! login handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::local::LocalProvider;
use crate::provider::{DeviceInfo, HsmKeyInfo, HsmProvider};
use crate::{HsmError, Result};

/// Wraps a [`LocalProvider`] behind a PIN gate.
pub struct MockProvider {
    inner: Arc<LocalProvider>,
    pin: String,
    unlocked: AtomicBool,
    available: AtomicBool,
}

impl MockProvider {
    pub fn new(pin: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(LocalProvider::new()),
            pin: pin.into(),
            unlocked: AtomicBool::new(false),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate unplugging the device.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn gate(&self) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(HsmError::NotAvailable);
        }
        if !self.unlocked.load(Ordering::SeqCst) {
            return Err(HsmError::PinRequired);
        }
        Ok(())
    }
}

#[async_trait]
impl HsmProvider for MockProvider {
    async fn detect_devices(&self) -> Result<Vec<DeviceInfo>> {
        if !self.available.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(vec![DeviceInfo {
            id: "mock".to_string(),
            label: "Mock token".to_string(),
        }])
    }

    async fn list_keys(&self) -> Result<Vec<HsmKeyInfo>> {
        self.gate()?;
        self.inner.list_keys().await
    }

    async fn get_public_key(&self, key_id: &str) -> Result<String> {
        self.gate()?;
        self.inner.get_public_key(key_id).await
    }

    async fn sign_hash(&self, key_id: &str, hash: &[u8; 32]) -> Result<[u8; 64]> {
        self.gate()?;
        self.inner.sign_hash(key_id, hash).await
    }

    async fn sign_event(&self, key_id: &str, template_json: &str) -> Result<String> {
        self.gate()?;
        self.inner.sign_event(key_id, template_json).await
    }

    async fn generate_key(&self, label: &str) -> Result<HsmKeyInfo> {
        self.gate()?;
        self.inner.generate_key(label).await
    }

    async fn import_key(&self, secret: &str, label: &str) -> Result<HsmKeyInfo> {
        self.gate()?;
        self.inner.import_key(secret, label).await
    }

    async fn delete_key(&self, key_id: &str) -> Result<()> {
        self.gate()?;
        self.inner.delete_key(key_id).await
    }

    async fn login(&self, pin: &str) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(HsmError::NotAvailable);
        }
        if pin != self.pin {
            return Err(HsmError::PinIncorrect);
        }
        self.unlocked.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        self.unlocked.store(false, Ordering::SeqCst);
        Ok(())
    }
}
