//! Configuration System
//!
//! Handles loading store configuration from TOML files with per-field
//! defaults, so a partial config file only overrides what it names.

use crate::error::{StoreError, StoreResult};
use serde::Deserialize;
use std::path::Path;

/// Store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Name of the root branch created on startup
    #[serde(default = "default_root_branch")]
    pub root_branch: String,

    /// Validate that indexing batches arrive ordered by (timestamp, branch).
    /// The ordering is an external invariant; this turns on a cheap check at
    /// the boundary for callers that want it enforced.
    #[serde(default = "default_validate_batch_order")]
    pub validate_batch_order: bool,
}

fn default_root_branch() -> String {
    "master".to_string()
}

fn default_validate_batch_order() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_branch: default_root_branch(),
            validate_batch_order: default_validate_batch_order(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Serialization(format!("Failed to read config: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| StoreError::Serialization(format!("Failed to parse config: {}", e)))
    }

    /// Load from file if it exists, otherwise defaults
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match Self::load(path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config from {:?}: {}, using defaults", path, e);
                }
            }
        }
        Self::default()
    }
}
