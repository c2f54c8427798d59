//! Built-in defaults as the lowest layer of every builder.

use crate::config::StoreConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with `StoreConfig::default()`.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Config::try_from(&StoreConfig::default())?;
    Ok(Config::builder().add_source(defaults))
}
