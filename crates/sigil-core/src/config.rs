//! Configuration file management.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{CoreError, Result};

/// Complete core configuration, TOML on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub relays: RelayConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub mls: MlsConfig,
}

/// Storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default resolved by the caller.
    #[serde(default)]
    pub data_dir: String,
}

/// Session behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle auto-lock in seconds; 0 disables.
    #[serde(default = "default_session_timeout")]
    pub timeout_secs: u32,
}

/// Relay endpoints and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub urls: Vec<String>,
    /// Per-publish timeout in seconds.
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u32,
}

/// Blob-server settings for encrypted media.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Base URL of the blob server.
    #[serde(default)]
    pub blob_server: String,
}

/// MLS housekeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlsConfig {
    /// Key-package rotation interval in hours.
    #[serde(default = "default_rotation_hours")]
    pub rotation_hours: u32,
}

impl CoreConfig {
    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)
            .map_err(|e| CoreError::BackendUnavailable(e.to_string()))?;
        toml::from_str(&data).map_err(|e| CoreError::InvalidInput(e.to_string()))
    }

    /// Write to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::BackendUnavailable(e.to_string()))?;
        }
        let data =
            toml::to_string_pretty(self).map_err(|e| CoreError::InvalidInput(e.to_string()))?;
        std::fs::write(path, data).map_err(|e| CoreError::BackendUnavailable(e.to_string()))
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_session_timeout(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            publish_timeout_secs: default_publish_timeout(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            blob_server: String::new(),
        }
    }
}

impl Default for MlsConfig {
    fn default() -> Self {
        Self {
            rotation_hours: default_rotation_hours(),
        }
    }
}

// Default value functions

fn default_session_timeout() -> u32 {
    900
}

fn default_publish_timeout() -> u32 {
    10
}

fn default_rotation_hours() -> u32 {
    24
}
