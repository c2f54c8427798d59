//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::StoreConfig;
use config::ConfigError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the standard sources. `data_dir` overrides
    /// every other source for the data directory.
    pub fn load(data_dir: Option<&Path>) -> Result<StoreConfig, ConfigError> {
        MergeService::load(data_dir)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<StoreConfig, ConfigError> {
        MergeService::load_from_file(path)
    }

    /// Create default configuration.
    pub fn default() -> StoreConfig {
        StoreConfig::default()
    }
}
