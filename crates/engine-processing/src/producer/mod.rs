use crate::{consumer::router::RouterMessage, error::LoaderError, producer::parser::EventParser};
use engine_core::{
    connectors::{sink::BadRowSink, source::EventSource},
    metrics::Metrics,
};
use futures::StreamExt;
use model::records::row::{Origin, ParsedRow};
use std::sync::Arc;
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod filter;
pub mod parser;

/// Pulls tokened batches from the source, parses them, registers them with
/// the router and forwards their rows to the batcher.
pub struct Producer {
    source: Arc<dyn EventSource>,
    sink: Arc<dyn BadRowSink>,
    parser: EventParser,
    metrics: Metrics,
    rows_tx: mpsc::Sender<Vec<ParsedRow>>,
    router_tx: mpsc::Sender<RouterMessage>,
}

impl Producer {
    pub fn new(
        source: Arc<dyn EventSource>,
        sink: Arc<dyn BadRowSink>,
        parser: EventParser,
        metrics: Metrics,
        rows_tx: mpsc::Sender<Vec<ParsedRow>>,
        router_tx: mpsc::Sender<RouterMessage>,
    ) -> Self {
        Self {
            source,
            sink,
            parser,
            metrics,
            rows_tx,
            router_tx,
        }
    }

    /// Runs until cancelled, the source ends or a stage downstream fails.
    /// Returns the number of tokened batches taken from the source.
    pub async fn run(self, cancel: CancellationToken) -> Result<u64, LoaderError> {
        let mut stream = self.source.stream();
        let mut seq = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Cancellation requested, no longer pulling from the source");
                    break;
                }
                next = stream.next() => next,
            };

            let Some(tokened) = next else {
                info!("Source stream ended");
                break;
            };
            let tokened = tokened?;
            let received = Instant::now();
            let origin = Origin::new(seq);
            seq += 1;

            let parsed = self.parser.parse(origin, &tokened);
            if parsed.skipped > 0 {
                info!(%origin, skipped = parsed.skipped, "Skipped events of excluded schemas");
            }

            if !parsed.bad.is_empty() {
                warn!(
                    %origin,
                    rows = parsed.bad.len(),
                    "Sending unparseable events to the bad row sink"
                );
                self.sink.sink_batch(&parsed.bad).await?;
                self.metrics.add_bad(parsed.bad.len() as u64);
            }

            self.router_tx
                .send(RouterMessage::Register {
                    origin,
                    rows: parsed.rows.len(),
                    tokens: tokened.tokens,
                    received,
                })
                .await
                .map_err(|_| LoaderError::PipelineClosed("router"))?;

            if !parsed.rows.is_empty() {
                self.rows_tx
                    .send(parsed.rows)
                    .await
                    .map_err(|_| LoaderError::PipelineClosed("batcher"))?;
            }
        }

        info!(batches = seq, "Producer finished");
        Ok(seq)
    }
}
