//! Provider configuration (loaded from castfs.toml).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{VfsError, VfsResult};

/// Recognized configuration options for a projection instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Root directory of the content-addressed object store (required).
    pub instance_path: PathBuf,
    /// Absolute directory path to become the projection root (required).
    pub virtual_root: PathBuf,
    /// Liveness window for all three cache maps, in seconds.
    pub cache_ttl_secs: u64,
    /// Enables verbose tracing.
    pub debug: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            instance_path: PathBuf::new(),
            virtual_root: PathBuf::new(),
            cache_ttl_secs: 3600,
            debug: false,
        }
    }
}

impl ProviderConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> VfsResult<Self> {
        toml::from_str(text)
            .map_err(|e| VfsError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    /// Check that the required paths are present.
    pub fn validate(&self) -> VfsResult<()> {
        if self.instance_path.as_os_str().is_empty() {
            return Err(VfsError::NotFound("instance_path is required".to_string()));
        }
        if self.virtual_root.as_os_str().is_empty() {
            return Err(VfsError::NotFound("virtual_root is required".to_string()));
        }
        Ok(())
    }

    /// Cache TTL as a duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
