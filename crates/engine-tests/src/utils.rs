use crate::mocks::{ActionLog, MockChannelFactory, MockSink, MockSource, MockTableManager};
use bytes::Bytes;
use engine_core::{
    coldswap::Coldswap,
    connectors::channel::{ChannelFactory, ChannelSwap},
    metrics::Metrics,
    retry::RetryPolicy,
    schema::SchemaManager,
};
use engine_processing::{Loader, config::LoaderOptions, error::LoaderError};
use model::{
    execution::outcome::WriteOutcome,
    records::{event::TokenedBatch, token::Token},
};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// Columns the mock destination table starts with.
pub const BASE_COLUMNS: &[&str] = &["event_id", "schema", "collector_tstamp", "load_tstamp"];

pub fn event(id: &str) -> Value {
    json!({
        "event_id": id,
        "schema": "iglu:com.acme/page_view/jsonschema/1-0-0",
        "collector_tstamp": "2024-05-01T10:00:00Z"
    })
}

pub fn tokened(token: u64, events: &[Value]) -> TokenedBatch {
    TokenedBatch::new(
        events
            .iter()
            .map(|event| Bytes::from(event.to_string()))
            .collect(),
        vec![Token::new(token)],
    )
}

/// Options that flush quickly and never back off for long.
pub fn test_options() -> LoaderOptions {
    LoaderOptions::default()
        .with_max_delay(Duration::from_millis(20))
        .with_upload_concurrency(2)
        .with_max_attempts(4)
}

/// The loader wired to mock capabilities that share one action log.
pub struct Harness {
    pub log: ActionLog,
    pub source: Arc<MockSource>,
    pub sink: Arc<MockSink>,
    pub table: Arc<MockTableManager>,
    pub factory: Arc<MockChannelFactory>,
    pub channels: Arc<ChannelSwap>,
    pub schema: Arc<SchemaManager>,
    pub metrics: Metrics,
}

pub struct HarnessBuilder {
    log: ActionLog,
    source: MockSource,
    sink: MockSink,
    table: MockTableManager,
    factory: Option<MockChannelFactory>,
    bind_channel_to_table: bool,
    write_delay: Option<Duration>,
}

impl HarnessBuilder {
    pub fn new(batches: Vec<TokenedBatch>) -> Self {
        let log = ActionLog::new();
        Self {
            source: MockSource::new(log.clone(), batches),
            sink: MockSink::new(log.clone()),
            table: MockTableManager::new(log.clone(), BASE_COLUMNS),
            factory: None,
            bind_channel_to_table: false,
            write_delay: None,
            log,
        }
    }

    pub fn source(mut self, build: impl FnOnce(MockSource) -> MockSource) -> Self {
        self.source = build(self.source);
        self
    }

    pub fn sink(mut self, build: impl FnOnce(MockSink) -> MockSink) -> Self {
        self.sink = build(self.sink);
        self
    }

    pub fn table(mut self, build: impl FnOnce(MockTableManager) -> MockTableManager) -> Self {
        self.table = build(self.table);
        self
    }

    pub fn outcomes(mut self, outcomes: Vec<WriteOutcome>) -> Self {
        self.factory = Some(MockChannelFactory::scripted(self.log.clone(), outcomes));
        self
    }

    /// Channels report rows with columns the table lacks as missing-column
    /// failures once the scripted outcomes are used up.
    pub fn channels_check_columns(mut self) -> Self {
        self.bind_channel_to_table = true;
        self
    }

    /// Every channel write takes `delay`.
    pub fn write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn build(self) -> Harness {
        let table = Arc::new(self.table);
        let mut factory = self
            .factory
            .unwrap_or_else(|| MockChannelFactory::new(self.log.clone()));
        if self.bind_channel_to_table {
            factory = factory.bound_to(table.clone());
        }
        if let Some(delay) = self.write_delay {
            factory = factory.with_write_delay(delay);
        }
        let factory = Arc::new(factory);

        let channel_factory: Arc<ChannelFactory> = factory.clone();
        let schema = Arc::new(SchemaManager::new(
            table.clone(),
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        ));

        Harness {
            log: self.log,
            source: Arc::new(self.source),
            sink: Arc::new(self.sink),
            table,
            factory,
            channels: Arc::new(Coldswap::new(channel_factory)),
            schema,
            metrics: Metrics::new(),
        }
    }
}

impl Harness {
    pub fn loader(&self, options: LoaderOptions) -> Loader {
        Loader::new(
            self.source.clone(),
            self.sink.clone(),
            self.schema.clone(),
            self.channels.clone(),
            self.metrics.clone(),
            options,
        )
    }

    /// Runs the loader until the scripted source is exhausted.
    pub async fn run(&self, options: LoaderOptions) -> Result<(), LoaderError> {
        self.loader(options).run(CancellationToken::new()).await
    }
}
