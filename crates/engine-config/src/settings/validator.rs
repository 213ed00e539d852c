use crate::{error::ConfigError, settings::LoaderConfig};
use model::core::column::is_plain_identifier;
use tracing::{info, warn};

const MIN_BAD_ROW_SIZE: usize = 1024;

/// Checks a [`LoaderConfig`] before anything is started with it. All problems
/// are collected and reported together.
pub struct ConfigValidator<'a> {
    config: &'a LoaderConfig,
}

impl<'a> ConfigValidator<'a> {
    pub fn new(config: &'a LoaderConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_batching(&mut errors);
        self.validate_retries(&mut errors);
        self.validate_destination(&mut errors);
        self.validate_source(&mut errors);

        if self.config.bad_row_max_size < MIN_BAD_ROW_SIZE {
            errors.push(format!(
                "bad_row_max_size must be at least {MIN_BAD_ROW_SIZE} bytes, got {}",
                self.config.bad_row_max_size
            ));
        }

        if self.config.schemas_to_skip.iter().any(|s| s.trim().is_empty()) {
            errors.push("schemas_to_skip must not contain empty entries".to_string());
        }

        if !errors.is_empty() {
            return Err(ConfigError::ValidationFailed(errors));
        }

        info!("Configuration validation completed successfully");
        Ok(())
    }

    fn validate_batching(&self, errors: &mut Vec<String>) {
        let batching = &self.config.batching;
        if batching.max_bytes == 0 {
            errors.push("batching.max_bytes must be greater than zero".to_string());
        }
        if batching.upload_concurrency == 0 {
            errors.push("batching.upload_concurrency must be greater than zero".to_string());
        } else if batching.upload_concurrency > 64 {
            warn!(
                "Upload concurrency {} is very high for a single channel",
                batching.upload_concurrency
            );
        }
        if batching.max_delay_ms == 0 {
            warn!("batching.max_delay_ms is zero, every row will be flushed on its own");
        }
    }

    fn validate_retries(&self, errors: &mut Vec<String>) {
        if self.config.retries.max_attempts == 0 {
            errors.push("retries.max_attempts must be greater than zero".to_string());
        }
    }

    fn validate_destination(&self, errors: &mut Vec<String>) {
        let destination = &self.config.destination;
        if destination.url.trim().is_empty() {
            errors.push("destination.url must be set".to_string());
        }
        if destination.table.is_empty() {
            errors.push("destination.table must be set".to_string());
        } else if !is_plain_identifier(&destination.table) {
            errors.push(format!(
                "destination.table '{}' is not a plain identifier",
                destination.table
            ));
        }
        if !is_plain_identifier(&destination.schema) {
            errors.push(format!(
                "destination.schema '{}' is not a plain identifier",
                destination.schema
            ));
        }
    }

    fn validate_source(&self, errors: &mut Vec<String>) {
        if self.config.source.batch_lines == 0 {
            errors.push("source.batch_lines must be greater than zero".to_string());
        }
        if self.config.source.follow && self.config.source.poll_interval_ms == 0 {
            errors.push("source.poll_interval_ms must be greater than zero when following".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failures(config: &LoaderConfig) -> Vec<String> {
        match config.validate() {
            Err(ConfigError::ValidationFailed(errors)) => errors,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let mut config = LoaderConfig::default();
        config.batching.max_bytes = 0;
        config.batching.upload_concurrency = 0;
        config.retries.max_attempts = 0;
        config.source.batch_lines = 0;

        let errors = failures(&config);
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("max_bytes")));
        assert!(errors.iter().any(|e| e.contains("upload_concurrency")));
        assert!(errors.iter().any(|e| e.contains("max_attempts")));
        assert!(errors.iter().any(|e| e.contains("batch_lines")));
    }

    #[test]
    fn test_small_bad_row_size_is_rejected() {
        let mut config = LoaderConfig::default();
        config.bad_row_max_size = 100;

        let errors = failures(&config);
        assert!(errors[0].contains("bad_row_max_size"));
    }

    #[test]
    fn test_unsafe_identifiers_are_rejected() {
        let mut config = LoaderConfig::default();
        config.destination.table = "events\"; drop table x; --".to_string();
        config.destination.schema = String::new();

        let errors = failures(&config);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_empty_table_is_rejected() {
        let mut config = LoaderConfig::default();
        config.destination.table = String::new();

        let errors = failures(&config);
        assert_eq!(errors, vec!["destination.table must be set".to_string()]);
    }
}
