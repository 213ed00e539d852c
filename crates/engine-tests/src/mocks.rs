//! Deterministic doubles of every capability the loader consumes. They all
//! append to one shared [`ActionLog`], so a test can assert on the exact
//! interleaving of channel, schema, sink and checkpoint operations.

use async_trait::async_trait;
use engine_core::{
    coldswap::ResourceFactory,
    connectors::{
        channel::{Channel, WriteChannel},
        sink::BadRowSink,
        source::{EventSource, HealthStatus},
        table::TableManager,
    },
    error::{ChannelError, SchemaError, SinkError, SourceError},
};
use futures::stream::{self, BoxStream, StreamExt};
use model::{
    execution::{
        bad_row::BadRow,
        outcome::{RowFailure, WriteOutcome},
    },
    records::{event::TokenedBatch, row::ParsedRow, token::Token},
};
use std::{
    collections::{HashSet, VecDeque},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    OpenedChannel,
    ClosedChannel,
    /// `(origin sequence, row index)` of every row handed to a channel.
    WroteRows(Vec<(u64, usize)>),
    AlterTableAddedColumns(Vec<String>),
    CreatedTable,
    SentToBad(usize),
    Checkpointed(Vec<Token>),
}

#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    actions: Arc<Mutex<Vec<Action>>>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, action: Action) {
        lock(&self.actions).push(action);
    }

    pub fn actions(&self) -> Vec<Action> {
        lock(&self.actions).clone()
    }

    pub fn count(&self, predicate: impl Fn(&Action) -> bool) -> usize {
        lock(&self.actions).iter().filter(|a| predicate(a)).count()
    }

    /// Every checkpointed token, in checkpoint order.
    pub fn checkpointed(&self) -> Vec<Token> {
        lock(&self.actions)
            .iter()
            .filter_map(|action| match action {
                Action::Checkpointed(tokens) => Some(tokens.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Every batch of rows handed to a channel, in write order.
    pub fn writes(&self) -> Vec<Vec<(u64, usize)>> {
        lock(&self.actions)
            .iter()
            .filter_map(|action| match action {
                Action::WroteRows(rows) => Some(rows.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Yields scripted tokened batches, then ends or stays open.
pub struct MockSource {
    log: ActionLog,
    batches: Mutex<Vec<TokenedBatch>>,
    hold_open: bool,
    read_error: Option<String>,
    started: AtomicBool,
}

impl MockSource {
    pub fn new(log: ActionLog, batches: Vec<TokenedBatch>) -> Self {
        Self {
            log,
            batches: Mutex::new(batches),
            hold_open: false,
            read_error: None,
            started: AtomicBool::new(false),
        }
    }

    /// Keeps the stream pending after the scripted batches, like a live
    /// source with nothing new to deliver.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Fails the stream after the scripted batches.
    pub fn with_read_error(mut self, message: &str) -> Self {
        self.read_error = Some(message.to_string());
        self
    }
}

#[async_trait]
impl EventSource for MockSource {
    fn stream(&self) -> BoxStream<'static, Result<TokenedBatch, SourceError>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return stream::once(async { Err(SourceError::AlreadyStarted) }).boxed();
        }

        let batches: Vec<_> = lock(&self.batches).drain(..).collect();
        let scripted = stream::iter(batches.into_iter().map(Ok::<_, SourceError>));

        match (&self.read_error, self.hold_open) {
            (Some(message), _) => {
                let err = SourceError::Read(message.clone().into());
                scripted.chain(stream::once(async move { Err(err) })).boxed()
            }
            (None, true) => scripted.chain(stream::pending()).boxed(),
            (None, false) => scripted.boxed(),
        }
    }

    async fn checkpoint(&self, tokens: &[Token]) -> Result<(), SourceError> {
        self.log.push(Action::Checkpointed(tokens.to_vec()));
        Ok(())
    }

    async fn is_healthy(&self, _max_latency: Duration) -> HealthStatus {
        HealthStatus::Healthy
    }
}

pub struct MockSink {
    log: ActionLog,
    rows: Mutex<Vec<BadRow>>,
    unavailable: bool,
}

impl MockSink {
    pub fn new(log: ActionLog) -> Self {
        Self {
            log,
            rows: Mutex::new(Vec::new()),
            unavailable: false,
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn rows(&self) -> Vec<BadRow> {
        lock(&self.rows).clone()
    }
}

#[async_trait]
impl BadRowSink for MockSink {
    async fn sink_batch(&self, rows: &[BadRow]) -> Result<(), SinkError> {
        if self.unavailable {
            return Err(SinkError::Unavailable("mock sink is down".to_string()));
        }
        lock(&self.rows).extend_from_slice(rows);
        self.log.push(Action::SentToBad(rows.len()));
        Ok(())
    }
}

/// An in-memory table. `add_columns` can be made to fail and
/// `create_table_if_missing` can fail transiently a number of times.
pub struct MockTableManager {
    log: ActionLog,
    columns: Mutex<Vec<String>>,
    reject_alter: bool,
    transient_create_failures: AtomicUsize,
}

impl MockTableManager {
    pub fn new(log: ActionLog, columns: &[&str]) -> Self {
        Self {
            log,
            columns: Mutex::new(columns.iter().map(|c| c.to_string()).collect()),
            reject_alter: false,
            transient_create_failures: AtomicUsize::new(0),
        }
    }

    pub fn rejecting_alter(mut self) -> Self {
        self.reject_alter = true;
        self
    }

    pub fn failing_create(self, times: usize) -> Self {
        self.transient_create_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn columns(&self) -> HashSet<String> {
        lock(&self.columns).iter().cloned().collect()
    }
}

#[async_trait]
impl TableManager for MockTableManager {
    async fn create_table_if_missing(&self) -> Result<(), SchemaError> {
        let failing = self
            .transient_create_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SchemaError::Transport("connection refused".into()));
        }
        self.log.push(Action::CreatedTable);
        Ok(())
    }

    async fn list_columns(&self) -> Result<Vec<String>, SchemaError> {
        Ok(lock(&self.columns).clone())
    }

    async fn add_columns(&self, columns: &[String]) -> Result<(), SchemaError> {
        if self.reject_alter {
            return Err(SchemaError::Rejected("permission denied".to_string()));
        }
        lock(&self.columns).extend(columns.iter().cloned());
        self.log.push(Action::AlterTableAddedColumns(columns.to_vec()));
        Ok(())
    }
}

/// Opens [`MockChannel`]s. Scripted outcomes are consumed in order across
/// all channels; once they run out a channel accepts everything, or, when
/// bound to a table, reports rows with columns the table lacked at open
/// time as missing-column failures.
pub struct MockChannelFactory {
    log: ActionLog,
    script: Arc<Mutex<VecDeque<WriteOutcome>>>,
    table: Option<Arc<MockTableManager>>,
    fail_open: AtomicBool,
    opened: AtomicUsize,
    gauge: Arc<WriteGauge>,
}

/// Tracks how many writes are in progress across all channels.
#[derive(Default)]
struct WriteGauge {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockChannelFactory {
    pub fn new(log: ActionLog) -> Self {
        Self {
            log,
            script: Arc::new(Mutex::new(VecDeque::new())),
            table: None,
            fail_open: AtomicBool::new(false),
            opened: AtomicUsize::new(0),
            gauge: Arc::new(WriteGauge::default()),
        }
    }

    pub fn scripted(log: ActionLog, outcomes: Vec<WriteOutcome>) -> Self {
        let factory = Self::new(log);
        lock(&factory.script).extend(outcomes);
        factory
    }

    pub fn bound_to(mut self, table: Arc<MockTableManager>) -> Self {
        self.table = Some(table);
        self
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Makes every write take `delay`, so overlapping writes can be observed.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.gauge = Arc::new(WriteGauge {
            delay,
            ..Default::default()
        });
        self
    }

    /// Most writes that were ever in progress at the same time.
    pub fn peak_concurrent_writes(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceFactory for MockChannelFactory {
    type Resource = Channel;
    type Error = ChannelError;

    async fn open(&self) -> Result<Channel, ChannelError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ChannelError::Open("destination unreachable".into()));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        self.log.push(Action::OpenedChannel);
        Ok(Box::new(MockChannel {
            log: self.log.clone(),
            script: self.script.clone(),
            columns: self.table.as_ref().map(|table| table.columns()),
            invalidated: AtomicBool::new(false),
            gauge: self.gauge.clone(),
        }))
    }

    async fn release(&self, channel: Channel) {
        drop(channel);
        self.log.push(Action::ClosedChannel);
    }
}

pub struct MockChannel {
    log: ActionLog,
    script: Arc<Mutex<VecDeque<WriteOutcome>>>,
    columns: Option<HashSet<String>>,
    invalidated: AtomicBool,
    gauge: Arc<WriteGauge>,
}

#[async_trait]
impl WriteChannel for MockChannel {
    async fn write(&self, rows: &[ParsedRow]) -> Result<WriteOutcome, ChannelError> {
        if self.invalidated.load(Ordering::SeqCst) {
            return Err(ChannelError::Write(
                "write issued on an invalidated channel".into(),
            ));
        }

        self.log.push(Action::WroteRows(
            rows.iter().map(|row| (row.origin.seq(), row.index)).collect(),
        ));

        if !self.gauge.delay.is_zero() {
            let now = self.gauge.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.gauge.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.gauge.delay).await;
            self.gauge.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        let scripted = lock(&self.script).pop_front();
        let outcome = match (scripted, &self.columns) {
            (Some(outcome), _) => outcome,
            (None, Some(columns)) => WriteOutcome::from_failures(
                rows.iter()
                    .enumerate()
                    .filter_map(|(index, row)| {
                        let unknown = row.unknown_columns(columns);
                        (!unknown.is_empty()).then(|| RowFailure::missing_columns(index, unknown))
                    })
                    .collect(),
            ),
            (None, None) => WriteOutcome::AllAccepted,
        };

        if outcome == WriteOutcome::ChannelInvalid {
            self.invalidated.store(true, Ordering::SeqCst);
        }
        Ok(outcome)
    }
}
