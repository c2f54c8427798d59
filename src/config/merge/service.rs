//! MergeService: orchestrates sources, applies merge policy, deserializes to StoreConfig.

use crate::config::sources::{environment, global_file, store_file};
use crate::config::StoreConfig;
use config::{ConfigError, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::merge_policy;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config from the standard sources.
    /// Precedence: defaults (lowest) -> global file -> store file -> environment (highest).
    ///
    /// The store file lives in the data directory, which the lower layers
    /// decide, so the data directory is resolved first.
    pub fn load(data_dir: Option<&Path>) -> Result<StoreConfig, ConfigError> {
        let data_dir = match data_dir {
            Some(dir) => dir.to_path_buf(),
            None => {
                let builder = merge_policy::builder_with_defaults()?;
                let builder = global_file::add_to_builder(builder)?;
                let builder = environment::add_to_builder(builder)?;
                builder.build()?.get::<PathBuf>("data_dir")?
            }
        };
        debug!(data_dir = %data_dir.display(), "Resolved data directory");

        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = store_file::add_to_builder(builder, &data_dir)?;
        let builder = environment::add_to_builder(builder)?;
        let builder = builder.set_override("data_dir", data_dir.to_string_lossy().to_string())?;

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load config from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<StoreConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        config.try_deserialize()
    }
}
