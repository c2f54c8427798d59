//! Store file source: <data_dir>/strata.toml (optional)

use crate::config::STORE_FILE_NAME;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};
use std::path::Path;

/// Add the store's own config file to builder.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    data_dir: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let path = data_dir.join(STORE_FILE_NAME);
    Ok(builder.add_source(
        File::from(path.as_path())
            .format(FileFormat::Toml)
            .required(false),
    ))
}
