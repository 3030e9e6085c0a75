//! Name → provider registry.

use std::sync::{Arc, Mutex};

use crate::provider::HsmProvider;
use crate::{HsmError, Result};

/// Concurrency-safe provider registry. Insertion order is preserved so
/// enumeration is deterministic.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Mutex<Vec<(String, Arc<dyn HsmProvider>)>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under a unique name.
    pub fn register(&self, name: &str, provider: Arc<dyn HsmProvider>) -> Result<()> {
        let mut providers = self.lock();
        if providers.iter().any(|(n, _)| n == name) {
            return Err(HsmError::DuplicateProvider(name.to_string()));
        }
        providers.push((name.to_string(), provider));
        tracing::debug!(name, "hsm provider registered");
        Ok(())
    }

    /// Fetch a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn HsmProvider>> {
        self.lock()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p.clone())
    }

    /// Registered names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, Arc<dyn HsmProvider>)>> {
        match self.providers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
