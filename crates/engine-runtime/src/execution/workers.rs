use engine_core::{connectors::source::EventSource, metrics::Metrics};
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Logs a metrics snapshot every `period` until cancelled.
pub fn spawn_metrics_reporter(
    metrics: Metrics,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = metrics.snapshot();
                    info!(
                        good = snapshot.good,
                        bad = snapshot.bad,
                        latency_ms = snapshot.latency_millis,
                        batches = snapshot.batches,
                        swaps = snapshot.swaps,
                        retries = snapshot.retries,
                        schema_evolutions = snapshot.schema_evolutions,
                        "Loader metrics"
                    );
                }
            }
        }
    })
}

/// Polls the source's health every `period` and warns while it reports
/// events waiting longer than `max_latency`. Returns the number of unhealthy
/// probes once cancelled.
pub fn spawn_health_monitor(
    source: Arc<dyn EventSource>,
    period: Duration,
    max_latency: Duration,
    cancel: CancellationToken,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut unhealthy = 0u64;
        let mut was_healthy = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let status = source.is_healthy(max_latency).await;
                    if status.is_healthy() {
                        if !was_healthy {
                            info!("Source is healthy again");
                        }
                        was_healthy = true;
                    } else {
                        unhealthy += 1;
                        was_healthy = false;
                        warn!(%status, max_latency_ms = max_latency.as_millis() as u64, "Source health check failed");
                    }
                }
            }
        }
        unhealthy
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engine_core::{connectors::source::HealthStatus, error::SourceError};
    use futures::stream::{self, BoxStream, StreamExt};
    use model::records::{event::TokenedBatch, token::Token};

    struct StuckSource;

    #[async_trait]
    impl EventSource for StuckSource {
        fn stream(&self) -> BoxStream<'static, Result<TokenedBatch, SourceError>> {
            stream::empty().boxed()
        }

        async fn checkpoint(&self, _tokens: &[Token]) -> Result<(), SourceError> {
            Ok(())
        }

        async fn is_healthy(&self, _max_latency: Duration) -> HealthStatus {
            HealthStatus::Unhealthy("events stuck".to_string())
        }
    }

    #[tokio::test]
    async fn test_health_monitor_counts_unhealthy_probes() {
        let cancel = CancellationToken::new();
        let handle = spawn_health_monitor(
            Arc::new(StuckSource),
            Duration::from_millis(5),
            Duration::from_secs(1),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(40)).await;
        cancel.cancel();
        let unhealthy = handle.await.unwrap();
        assert!(unhealthy >= 1);
    }

    #[tokio::test]
    async fn test_metrics_reporter_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let metrics = Metrics::new();
        metrics.add_good(3);

        let handle = spawn_metrics_reporter(metrics, Duration::from_millis(5), cancel.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
