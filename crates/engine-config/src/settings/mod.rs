use crate::{error::ConfigError, settings::validator::ConfigValidator};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub mod batching;
pub mod endpoints;
pub mod monitoring;
pub mod retries;
pub mod validator;

pub use batching::BatchingSettings;
pub use endpoints::{BadRowSettings, DestinationSettings, SourceSettings};
pub use monitoring::MonitoringSettings;
pub use retries::RetrySettings;

pub const DEFAULT_PROCESSOR: &str = "streamload";
pub const DEFAULT_BAD_ROW_MAX_SIZE: usize = 1_000_000;

/// Everything the loader and its runtime need, read from one JSON document.
/// Every field has a default, so `{}` is a valid (if not very useful) config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Name stamped on every bad row.
    pub processor: String,
    pub batching: BatchingSettings,
    pub retries: RetrySettings,
    /// Event schemas excluded from loading. An entry ending in `*` matches by
    /// prefix, any other entry matches exactly.
    pub schemas_to_skip: Vec<String>,
    pub bad_row_max_size: usize,
    pub destination: DestinationSettings,
    pub source: SourceSettings,
    pub bad_rows: BadRowSettings,
    pub monitoring: MonitoringSettings,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            processor: DEFAULT_PROCESSOR.to_string(),
            batching: BatchingSettings::default(),
            retries: RetrySettings::default(),
            schemas_to_skip: Vec::new(),
            bad_row_max_size: DEFAULT_BAD_ROW_MAX_SIZE,
            destination: DestinationSettings::default(),
            source: SourceSettings::default(),
            bad_rows: BadRowSettings::default(),
            monitoring: MonitoringSettings::default(),
        }
    }
}

impl LoaderConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and validates the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config = Self::from_json(&json)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigValidator::new(self).validate()
    }
}
