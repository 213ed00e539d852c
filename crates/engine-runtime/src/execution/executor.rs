use crate::{
    error::RuntimeError,
    execution::{factory, workers},
};
use engine_config::settings::LoaderConfig;
use engine_core::metrics::{Metrics, MetricsSnapshot};
use engine_processing::{Loader, config::LoaderOptions};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Builds the production source, sink and destination from `config` and runs
/// the loader until `cancel` fires, the source ends or a fatal error occurs.
pub async fn run(
    config: LoaderConfig,
    cancel: CancellationToken,
) -> Result<MetricsSnapshot, RuntimeError> {
    LoadExecutor::new(config, cancel)?.execute().await
}

struct LoadExecutor {
    config: LoaderConfig,
    cancel: CancellationToken,
    metrics: Metrics,
}

impl LoadExecutor {
    fn new(config: LoaderConfig, cancel: CancellationToken) -> Result<Self, RuntimeError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel,
            metrics: Metrics::new(),
        })
    }

    async fn execute(self) -> Result<MetricsSnapshot, RuntimeError> {
        let start_time = Instant::now();
        let config = &self.config;
        info!(
            processor = %config.processor,
            table = %config.destination.qualified_table(),
            source = %config.source.path.display(),
            "Starting loader run"
        );

        let offsets = factory::create_offset_store(config)?;
        let source = factory::create_source(config, offsets)?;
        let sink = factory::create_sink(config);
        let schema = factory::create_schema_manager(config)?;
        let channels = factory::create_channels(config);

        // Background tasks outlive the loader only until this token fires.
        let background = self.cancel.child_token();
        let reporter = workers::spawn_metrics_reporter(
            self.metrics.clone(),
            config.monitoring.report_interval(),
            background.clone(),
        );
        let monitor = workers::spawn_health_monitor(
            source.clone(),
            config.monitoring.health_interval(),
            config.monitoring.max_latency(),
            background.clone(),
        );

        let loader = Loader::new(
            source,
            sink,
            schema,
            channels,
            self.metrics.clone(),
            LoaderOptions::from(config),
        );
        let result = loader.run(self.cancel.clone()).await;

        background.cancel();
        reporter.await?;
        let unhealthy = monitor.await?;
        if unhealthy > 0 {
            warn!(unhealthy, "Source reported unhealthy during the run");
        }

        result?;
        let snapshot = self.metrics.snapshot();
        info!(
            good = snapshot.good,
            bad = snapshot.bad,
            duration_ms = start_time.elapsed().as_millis() as u64,
            cancelled = self.cancel.is_cancelled(),
            "Loader run completed"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_start() {
        let mut config = LoaderConfig::default();
        config.batching.upload_concurrency = 0;

        let err = run(config, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[tokio::test]
    async fn test_missing_source_directory_fails_initialization() {
        let dir = TempDir::new().unwrap();
        let mut config = LoaderConfig::default();
        config.source.path = dir.path().join("missing");
        config.source.state_dir = dir.path().join("state");

        let err = run(config, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::InitializationError(_)));
    }
}
