//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.
//!
//! Environment variables use the `BILLING__` prefix with `__` between
//! levels, e.g. `BILLING__STORAGE__TYPE=dynamo` or
//! `BILLING__EXECUTOR__LOCK_TTL_SECS=7200`.

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const CONFIG_ENV_VAR: &str = "BILLING_CONFIG";
pub const CONFIG_ENV_PREFIX: &str = "BILLING";
pub const LOG_ENV_VAR: &str = "BILLING_LOG";

use serde::Deserialize;

use crate::executor::ExecutorConfig;
use crate::index::IndexConfig;
use crate::storage::StorageConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub index: IndexConfig,
    pub executor: ExecutorConfig,
}

impl Config {
    /// Load configuration.
    ///
    /// Sources, later ones overriding earlier ones: `config.yaml` in the
    /// working directory, the `path` argument, the file named by
    /// `BILLING_CONFIG`, then `BILLING__*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }
}
