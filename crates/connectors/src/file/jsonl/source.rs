use crate::file::jsonl::{ledger::AckLedger, reader::JsonlReader};
use async_trait::async_trait;
use engine_core::{
    connectors::source::{EventSource, HealthStatus},
    error::SourceError,
    state::OffsetStore,
};
use futures_util::stream::{self, BoxStream, StreamExt};
use model::records::{event::TokenedBatch, token::Token};
use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Event source over a directory of newline-delimited JSON files.
///
/// Every chunk of up to `batch_lines` lines becomes one tokened batch. A
/// checkpointed token stands for its line range; per-file offsets are
/// persisted once all earlier lines of the file are checkpointed too, so a
/// restart resumes exactly after the last fully processed line.
pub struct JsonlSource {
    dir: PathBuf,
    batch_lines: usize,
    follow: bool,
    poll_interval: Duration,
    offsets: Arc<dyn OffsetStore>,
    ledger: Arc<Mutex<AckLedger>>,
    started: AtomicBool,
}

struct StreamState {
    reader: JsonlReader,
    ledger: Arc<Mutex<AckLedger>>,
    follow: bool,
    poll_interval: Duration,
    failed: bool,
}

impl JsonlSource {
    pub fn new(
        dir: impl Into<PathBuf>,
        batch_lines: usize,
        follow: bool,
        offsets: Arc<dyn OffsetStore>,
    ) -> Self {
        Self {
            dir: dir.into(),
            batch_lines,
            follow,
            poll_interval: DEFAULT_POLL_INTERVAL,
            offsets,
            ledger: Arc::new(Mutex::new(AckLedger::new())),
            started: AtomicBool::new(false),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn next(mut state: StreamState) -> Option<(Result<TokenedBatch, SourceError>, StreamState)> {
        if state.failed {
            return None;
        }

        loop {
            match state.reader.next_batch().await {
                Ok(Some(chunk)) => {
                    let token = state
                        .ledger
                        .lock()
                        .await
                        .issue(&chunk.file, chunk.start, chunk.end);
                    debug!(
                        file = %chunk.file,
                        start = chunk.start,
                        end = chunk.end,
                        %token,
                        "Read chunk"
                    );
                    let batch = TokenedBatch::new(chunk.events, vec![token]);
                    return Some((Ok(batch), state));
                }
                Ok(None) if state.follow => tokio::time::sleep(state.poll_interval).await,
                Ok(None) => {
                    info!("All files read");
                    return None;
                }
                Err(err) => {
                    state.failed = true;
                    return Some((Err(err), state));
                }
            }
        }
    }
}

#[async_trait]
impl EventSource for JsonlSource {
    fn stream(&self) -> BoxStream<'static, Result<TokenedBatch, SourceError>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return stream::once(async { Err(SourceError::AlreadyStarted) }).boxed();
        }

        info!(dir = %self.dir.display(), follow = self.follow, "Starting file source");
        let state = StreamState {
            reader: JsonlReader::new(
                self.dir.clone(),
                self.batch_lines,
                self.follow,
                self.offsets.clone(),
            ),
            ledger: self.ledger.clone(),
            follow: self.follow,
            poll_interval: self.poll_interval,
            failed: false,
        };
        stream::unfold(state, Self::next).boxed()
    }

    async fn checkpoint(&self, tokens: &[Token]) -> Result<(), SourceError> {
        let advanced = {
            let mut ledger = self.ledger.lock().await;
            let mut advanced = Vec::new();
            for token in tokens {
                if let Some(offset) = ledger.ack(*token)? {
                    advanced.push(offset);
                }
            }
            advanced
        };

        for offset in &advanced {
            self.offsets
                .save_offset(offset)
                .await
                .map_err(|e| SourceError::Checkpoint(Box::new(e)))?;
            debug!(file = %offset.file, lines_done = offset.lines_done, "Saved offset");
        }
        Ok(())
    }

    async fn is_healthy(&self, max_latency: Duration) -> HealthStatus {
        let ledger = self.ledger.lock().await;
        match ledger.oldest_outstanding() {
            Some(issued_at) if issued_at.elapsed() > max_latency => HealthStatus::Unhealthy(format!(
                "{} batches pending, oldest for {}s",
                ledger.outstanding(),
                issued_at.elapsed().as_secs()
            )),
            _ => HealthStatus::Healthy,
        }
    }
}
