//! Layered configuration for the store.
//!
//! Sources, lowest to highest precedence: built-in defaults, the global file
//! `$XDG_CONFIG_HOME/strata/config.toml`, `<data_dir>/strata.toml`, then
//! `STRATA__*` environment variables.

mod facade;
pub mod merge;
pub mod paths;
pub mod sources;

pub use facade::ConfigLoader;
pub use paths::xdg_root as xdg;

use crate::error::StorageError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Name of the per-store configuration file inside the data directory.
pub const STORE_FILE_NAME: &str = "strata.toml";

/// One repository of documents under `<data_dir>/repos/<name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,

    /// Edits may be written back to this repository.
    #[serde(default)]
    pub editable: bool,

    /// Hidden repositories are left out of the category views.
    #[serde(default = "default_true")]
    pub visible: bool,
}

impl RepositoryConfig {
    pub fn new(name: &str, editable: bool) -> Self {
        Self {
            name: name.to_string(),
            editable,
            visible: true,
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root holding `repos/`, `jobs/` and `client/`.
    #[serde(default = "xdg::default_data_dir")]
    pub data_dir: PathBuf,

    /// Repositories in precedence order. The first editable visible one
    /// receives edits.
    #[serde(default = "default_repositories")]
    pub repositories: Vec<RepositoryConfig>,

    /// Document categories assembled across repositories.
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    /// File name inside each job folder.
    #[serde(default = "default_jobs_suffix")]
    pub jobs_suffix: String,

    /// Autosave period; 0 disables the background worker.
    #[serde(default = "default_autosave_interval_ms")]
    pub autosave_interval_ms: u64,

    /// Recently used documents kept resident per container.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Reject files without a well-formed header instead of guessing.
    #[serde(default)]
    pub strict_schema: bool,

    /// Watch the data directory for external changes.
    #[serde(default)]
    pub watch: bool,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_true() -> bool {
    true
}

fn default_repositories() -> Vec<RepositoryConfig> {
    vec![RepositoryConfig::new("local", true)]
}

fn default_categories() -> Vec<String> {
    vec!["models".to_string(), "references".to_string()]
}

fn default_jobs_suffix() -> String {
    "job".to_string()
}

fn default_autosave_interval_ms() -> u64 {
    30_000
}

fn default_cache_capacity() -> usize {
    crate::store::DEFAULT_CACHE_CAPACITY
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: xdg::default_data_dir(),
            repositories: default_repositories(),
            categories: default_categories(),
            jobs_suffix: default_jobs_suffix(),
            autosave_interval_ms: default_autosave_interval_ms(),
            cache_capacity: default_cache_capacity(),
            strict_schema: false,
            watch: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Default configuration rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.data_dir.join("repos")
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir.join("jobs")
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join("client").join("state")
    }

    /// Check names used as path segments.
    pub fn validate(&self) -> Result<(), StorageError> {
        let mut seen = BTreeSet::new();
        for repository in &self.repositories {
            check_segment("repository", &repository.name)?;
            if !seen.insert(repository.name.as_str()) {
                return Err(StorageError::ConfigError(format!(
                    "Duplicate repository: {}",
                    repository.name
                )));
            }
        }
        let mut seen = BTreeSet::new();
        for category in &self.categories {
            check_segment("category", category)?;
            if !seen.insert(category.as_str()) {
                return Err(StorageError::ConfigError(format!(
                    "Duplicate category: {}",
                    category
                )));
            }
        }
        check_segment("jobs suffix", &self.jobs_suffix)
    }

    /// Render as TOML, the format of the configuration files.
    pub fn to_toml(&self) -> Result<String, StorageError> {
        toml::to_string_pretty(self).map_err(|e| StorageError::ConfigError(e.to_string()))
    }
}

fn check_segment(what: &str, name: &str) -> Result<(), StorageError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.starts_with('.');
    if bad {
        return Err(StorageError::ConfigError(format!(
            "Invalid {} name: {:?}",
            what, name
        )));
    }
    Ok(())
}
