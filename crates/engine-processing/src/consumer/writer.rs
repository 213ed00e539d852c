use crate::error::LoaderError;
use engine_core::{connectors::channel::ChannelSwap, metrics::Metrics, schema::SchemaManager};
use model::{
    execution::outcome::{FailureReason, RowFailure, WriteOutcome},
    records::{batch::Batch, row::ParsedRow},
};
use std::{collections::HashMap, sync::Arc, time::Instant};
use tracing::{debug, info, warn};

/// A batch whose every row was either accepted or definitely rejected.
/// Indices point into `batch.rows`.
#[derive(Debug)]
pub struct ResolvedBatch {
    pub batch: Batch,
    pub accepted: Vec<usize>,
    pub rejected: Vec<(usize, String)>,
}

/// What the rows of one submission turned out to need.
#[derive(Debug, Default)]
struct Triage {
    accepted: Vec<usize>,
    rejected: Vec<(usize, String)>,
    missing: Vec<usize>,
    columns: Vec<String>,
}

/// Drives one batch to resolution: writes through the shared channel,
/// evolves the schema and swaps the channel as the destination asks for it,
/// and resubmits the rows that still need it.
pub struct BatchWriter {
    channels: Arc<ChannelSwap>,
    schema: Arc<SchemaManager>,
    metrics: Metrics,
    max_attempts: usize,
}

impl BatchWriter {
    pub fn new(
        channels: Arc<ChannelSwap>,
        schema: Arc<SchemaManager>,
        metrics: Metrics,
        max_attempts: usize,
    ) -> Self {
        Self {
            channels,
            schema,
            metrics,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn write_batch(&self, batch: Batch) -> Result<ResolvedBatch, LoaderError> {
        let start = Instant::now();
        let mut accepted = Vec::with_capacity(batch.len());
        let mut rejected = Vec::new();
        let mut pending: Vec<usize> = (0..batch.len()).collect();
        let mut attempt = 0;

        info!(batch_id = %batch.id, rows = batch.len(), "Writing batch");

        while !pending.is_empty() {
            if attempt >= self.max_attempts {
                return Err(LoaderError::RetriesExhausted {
                    batch_id: batch.id.clone(),
                    attempts: attempt,
                    unresolved: pending.len(),
                });
            }
            attempt += 1;
            if attempt > 1 {
                self.metrics.add_retries(1);
            }

            let outcome = if pending.len() == batch.len() {
                self.submit(&batch.rows).await?
            } else {
                let rows: Vec<ParsedRow> = pending.iter().map(|&i| batch.rows[i].clone()).collect();
                self.submit(&rows).await?
            };

            debug!(batch_id = %batch.id, attempt, %outcome, "Write attempt finished");

            match outcome {
                WriteOutcome::AllAccepted => accepted.append(&mut pending),
                WriteOutcome::ChannelInvalid => {
                    warn!(
                        batch_id = %batch.id,
                        attempt,
                        rows = pending.len(),
                        "Channel invalidated, swapping before resubmitting"
                    );
                    self.swap().await?;
                }
                WriteOutcome::PartialFailures(failures) => {
                    let triage = self.triage(&batch, &pending, failures).await;
                    accepted.extend(triage.accepted);
                    rejected.extend(triage.rejected);

                    if !triage.missing.is_empty() {
                        warn!(
                            batch_id = %batch.id,
                            attempt,
                            rows = triage.missing.len(),
                            columns = ?triage.columns,
                            "Rows reference columns missing from the destination"
                        );
                        let added = self.schema.add_columns(&triage.columns).await.map_err(
                            |source| LoaderError::SchemaEvolution {
                                batch_id: batch.id.clone(),
                                source,
                            },
                        )?;
                        if !added.is_empty() {
                            self.metrics.add_schema_evolutions(1);
                        }
                        self.swap().await?;
                    }
                    pending = triage.missing;
                }
            }
        }

        accepted.sort_unstable();
        info!(
            batch_id = %batch.id,
            accepted = accepted.len(),
            rejected = rejected.len(),
            attempts = attempt,
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch resolved"
        );

        Ok(ResolvedBatch {
            batch,
            accepted,
            rejected,
        })
    }

    /// One write through the live channel. The borrow ends before returning so
    /// a swap issued by the caller does not wait on it.
    async fn submit(&self, rows: &[ParsedRow]) -> Result<WriteOutcome, LoaderError> {
        let channel = self.channels.opened().await?;
        Ok(channel.write(rows).await?)
    }

    async fn swap(&self) -> Result<(), LoaderError> {
        self.channels.swap().await?;
        self.metrics.add_swaps(1);
        Ok(())
    }

    /// Sorts the submitted rows by what the destination reported. `pending`
    /// maps submission positions back to batch indices.
    async fn triage(
        &self,
        batch: &Batch,
        pending: &[usize],
        failures: Vec<RowFailure>,
    ) -> Triage {
        let mut by_position: HashMap<usize, FailureReason> = HashMap::with_capacity(failures.len());
        for failure in failures {
            if failure.index >= pending.len() {
                warn!(
                    batch_id = %batch.id,
                    index = failure.index,
                    "Destination reported a failure for a row it was not given"
                );
                continue;
            }
            by_position.insert(failure.index, failure.reason);
        }

        let mut triage = Triage::default();
        let mut known = None;

        for (position, &index) in pending.iter().enumerate() {
            match by_position.remove(&position) {
                None => triage.accepted.push(index),
                Some(FailureReason::Other(message)) => triage.rejected.push((index, message)),
                Some(FailureReason::MissingColumns(names)) => {
                    let names = if names.is_empty() {
                        if known.is_none() {
                            known = Some(self.schema.known_columns().await);
                        }
                        known
                            .as_ref()
                            .map(|known| batch.rows[index].unknown_columns(known))
                            .unwrap_or_default()
                    } else {
                        names
                    };

                    for name in names {
                        if !triage.columns.contains(&name) {
                            triage.columns.push(name);
                        }
                    }
                    triage.missing.push(index);
                }
            }
        }

        triage
    }
}
