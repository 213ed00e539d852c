//! Tracks how much of every tokened batch is still unresolved and
//! checkpoints its tokens once nothing is left.
//!
//! A row is resolved when the destination accepted it or when it was handed
//! to the bad row sink and the sink acknowledged it. Parse-stage bad rows
//! and skipped events never reach the router: the producer registers only the
//! rows it forwards to the batcher.

use crate::{consumer::writer::ResolvedBatch, error::LoaderError};
use engine_core::{
    connectors::{sink::BadRowSink, source::EventSource},
    metrics::Metrics,
};
use model::{
    execution::bad_row::BadRow,
    records::{row::Origin, token::Token},
};
use std::{collections::HashMap, sync::Arc};
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub enum RouterMessage {
    /// A tokened batch entered the pipeline with `rows` loadable rows.
    Register {
        origin: Origin,
        rows: usize,
        tokens: Vec<Token>,
        received: Instant,
    },
    /// Every row of a batch was accepted or rejected.
    Resolved(ResolvedBatch),
}

#[derive(Debug)]
struct Pending {
    remaining: usize,
    tokens: Vec<Token>,
    received: Instant,
}

pub struct Router {
    source: Arc<dyn EventSource>,
    sink: Arc<dyn BadRowSink>,
    metrics: Metrics,
    processor: String,
    bad_row_max_size: usize,
    ledger: HashMap<Origin, Pending>,
}

impl Router {
    pub fn new(
        source: Arc<dyn EventSource>,
        sink: Arc<dyn BadRowSink>,
        metrics: Metrics,
        processor: impl Into<String>,
        bad_row_max_size: usize,
    ) -> Self {
        Self {
            source,
            sink,
            metrics,
            processor: processor.into(),
            bad_row_max_size,
            ledger: HashMap::new(),
        }
    }

    /// Runs until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<RouterMessage>) -> Result<(), LoaderError> {
        while let Some(message) = rx.recv().await {
            match message {
                RouterMessage::Register {
                    origin,
                    rows,
                    tokens,
                    received,
                } => self.register(origin, rows, tokens, received).await?,
                RouterMessage::Resolved(resolved) => self.resolve(resolved).await?,
            }
        }

        if !self.ledger.is_empty() {
            warn!(
                unresolved = self.ledger.len(),
                "Router stopped with tokened batches left unresolved; they will be replayed"
            );
        }
        info!("Router finished");
        Ok(())
    }

    /// Number of tokened batches not yet checkpointed.
    pub fn unresolved(&self) -> usize {
        self.ledger.len()
    }

    pub async fn register(
        &mut self,
        origin: Origin,
        rows: usize,
        tokens: Vec<Token>,
        received: Instant,
    ) -> Result<(), LoaderError> {
        if rows == 0 {
            debug!(%origin, "Nothing to load, checkpointing immediately");
            return self.checkpoint(origin, &tokens).await;
        }

        self.ledger.insert(
            origin,
            Pending {
                remaining: rows,
                tokens,
                received,
            },
        );
        Ok(())
    }

    pub async fn resolve(&mut self, resolved: ResolvedBatch) -> Result<(), LoaderError> {
        let batch = &resolved.batch;

        if !resolved.rejected.is_empty() {
            let bad_rows: Vec<BadRow> = resolved
                .rejected
                .iter()
                .map(|(index, reason)| {
                    BadRow::from_rejected(
                        &self.processor,
                        &batch.rows[*index],
                        &batch.id,
                        reason.as_str(),
                        self.bad_row_max_size,
                    )
                })
                .collect();

            warn!(
                batch_id = %batch.id,
                rows = bad_rows.len(),
                "Sending rejected rows to the bad row sink"
            );
            self.sink.sink_batch(&bad_rows).await?;
        }

        self.metrics.add_good(resolved.accepted.len() as u64);
        self.metrics.add_bad(resolved.rejected.len() as u64);
        self.metrics.add_batches(1);

        let mut oldest: Option<Instant> = None;
        let mut completed = Vec::new();
        for (origin, count) in batch.origin_counts() {
            let Some(pending) = self.ledger.get_mut(&origin) else {
                error!(%origin, batch_id = %batch.id, "Resolved rows of an unregistered batch");
                continue;
            };

            oldest = Some(match oldest {
                Some(current) => current.min(pending.received),
                None => pending.received,
            });

            pending.remaining = pending.remaining.saturating_sub(count);
            if pending.remaining == 0 {
                completed.push(origin);
            }
        }

        if let Some(received) = oldest {
            self.metrics
                .set_latency_millis(received.elapsed().as_millis() as u64);
        }

        for origin in completed {
            if let Some(pending) = self.ledger.remove(&origin) {
                self.checkpoint(origin, &pending.tokens).await?;
            }
        }

        Ok(())
    }

    async fn checkpoint(&self, origin: Origin, tokens: &[Token]) -> Result<(), LoaderError> {
        if tokens.is_empty() {
            return Ok(());
        }
        self.source.checkpoint(tokens).await?;
        debug!(%origin, tokens = tokens.len(), "Checkpointed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use engine_core::{
        connectors::source::HealthStatus,
        error::{SinkError, SourceError},
    };
    use futures::stream::{self, BoxStream};
    use model::records::{batch::Batch, event::TokenedBatch, row::ParsedRow};
    use serde_json::{Map, json};
    use std::{sync::Mutex, time::Duration};

    #[derive(Default)]
    struct Recorder {
        checkpoints: Mutex<Vec<Vec<Token>>>,
        bad: Mutex<Vec<BadRow>>,
    }

    #[async_trait]
    impl EventSource for Recorder {
        fn stream(&self) -> BoxStream<'static, Result<TokenedBatch, SourceError>> {
            Box::pin(stream::empty())
        }

        async fn checkpoint(&self, tokens: &[Token]) -> Result<(), SourceError> {
            self.checkpoints.lock().unwrap().push(tokens.to_vec());
            Ok(())
        }

        async fn is_healthy(&self, _max_latency: Duration) -> HealthStatus {
            HealthStatus::Healthy
        }
    }

    #[async_trait]
    impl BadRowSink for Recorder {
        async fn sink_batch(&self, rows: &[BadRow]) -> Result<(), SinkError> {
            // Checkpoints must never overtake the bad rows of the same batch.
            assert!(self.checkpoints.lock().unwrap().is_empty());
            self.bad.lock().unwrap().extend_from_slice(rows);
            Ok(())
        }
    }

    fn row(origin: u64, index: usize) -> ParsedRow {
        let value = json!({ "event_id": format!("{origin}-{index}") });
        let mut fields = Map::new();
        fields.insert("event_id".to_string(), value["event_id"].clone());
        ParsedRow::new(
            Origin::new(origin),
            index,
            fields,
            Bytes::from(value.to_string()),
        )
    }

    fn router(recorder: &Arc<Recorder>) -> Router {
        Router::new(recorder.clone(), recorder.clone(), Metrics::new(), "test", 2048)
    }

    #[tokio::test]
    async fn test_checkpoints_only_when_all_rows_resolved() {
        let recorder = Arc::new(Recorder::default());
        let mut router = router(&recorder);

        router
            .register(Origin::new(0), 3, vec![Token::new(10)], Instant::now())
            .await
            .unwrap();

        router
            .resolve(ResolvedBatch {
                batch: Batch::new(0, vec![row(0, 0), row(0, 1)]),
                accepted: vec![0, 1],
                rejected: vec![],
            })
            .await
            .unwrap();
        assert!(recorder.checkpoints.lock().unwrap().is_empty());
        assert_eq!(router.unresolved(), 1);

        router
            .resolve(ResolvedBatch {
                batch: Batch::new(1, vec![row(0, 2)]),
                accepted: vec![],
                rejected: vec![(0, "value too long".to_string())],
            })
            .await
            .unwrap();

        assert_eq!(
            *recorder.checkpoints.lock().unwrap(),
            vec![vec![Token::new(10)]]
        );
        let bad = recorder.bad.lock().unwrap();
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].row_index, Some(2));
        assert_eq!(bad[0].batch_id.as_deref(), Some("batch-000001"));
        assert_eq!(router.unresolved(), 0);
    }

    #[tokio::test]
    async fn test_batches_resolve_out_of_order() {
        let recorder = Arc::new(Recorder::default());
        let mut router = router(&recorder);

        router
            .register(Origin::new(0), 1, vec![Token::new(1)], Instant::now())
            .await
            .unwrap();
        router
            .register(Origin::new(1), 1, vec![Token::new(2)], Instant::now())
            .await
            .unwrap();

        router
            .resolve(ResolvedBatch {
                batch: Batch::new(0, vec![row(1, 0)]),
                accepted: vec![0],
                rejected: vec![],
            })
            .await
            .unwrap();

        assert_eq!(
            *recorder.checkpoints.lock().unwrap(),
            vec![vec![Token::new(2)]]
        );
        assert_eq!(router.metrics.snapshot().good, 1);
    }

    #[tokio::test]
    async fn test_empty_registration_checkpoints_immediately() {
        let recorder = Arc::new(Recorder::default());
        let mut router = router(&recorder);

        router
            .register(Origin::new(0), 0, vec![Token::new(7)], Instant::now())
            .await
            .unwrap();

        assert_eq!(
            *recorder.checkpoints.lock().unwrap(),
            vec![vec![Token::new(7)]]
        );
        assert_eq!(router.unresolved(), 0);
    }
}
