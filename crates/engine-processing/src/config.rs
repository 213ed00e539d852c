use engine_config::settings::LoaderConfig;
use std::time::Duration;

/// The subset of [`LoaderConfig`] the pipeline itself reads.
#[derive(Clone, Debug)]
pub struct LoaderOptions {
    /// Name stamped on bad rows.
    pub processor: String,
    pub max_bytes: usize,
    pub max_delay: Duration,
    /// Never zero; set through [`LoaderOptions::with_upload_concurrency`].
    upload_concurrency: usize,
    /// Write attempts per batch, counting the first one.
    pub max_attempts: usize,
    pub schemas_to_skip: Vec<String>,
    pub bad_row_max_size: usize,
    /// Tokened batches buffered between the source and the batcher.
    pub max_pending_events: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self::from(&LoaderConfig::default())
    }
}

impl From<&LoaderConfig> for LoaderOptions {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            processor: config.processor.clone(),
            max_bytes: config.batching.max_bytes,
            max_delay: config.batching.max_delay(),
            upload_concurrency: config.batching.upload_concurrency.max(1),
            max_attempts: config.retries.max_attempts.max(1),
            schemas_to_skip: config.schemas_to_skip.clone(),
            bad_row_max_size: config.bad_row_max_size,
            max_pending_events: 16,
        }
    }
}

impl LoaderOptions {
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Batches that may be written at the same time.
    pub fn upload_concurrency(&self) -> usize {
        self.upload_concurrency
    }

    pub fn with_upload_concurrency(mut self, upload_concurrency: usize) -> Self {
        self.upload_concurrency = upload_concurrency.max(1);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_schemas_to_skip(mut self, schemas: Vec<String>) -> Self {
        self.schemas_to_skip = schemas;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_concurrency_is_at_least_one() {
        assert_eq!(LoaderOptions::default().with_upload_concurrency(0).upload_concurrency(), 1);

        let mut config = LoaderConfig::default();
        config.batching.upload_concurrency = 0;
        assert_eq!(LoaderOptions::from(&config).upload_concurrency(), 1);
    }
}
