use crate::{
    config::LoaderOptions,
    consumer::{batcher::Batcher, router::Router, uploader::Uploader, writer::BatchWriter},
    error::LoaderError,
    producer::{Producer, filter::SchemaFilter, parser::EventParser},
};
use engine_core::{
    connectors::{channel::ChannelSwap, sink::BadRowSink, source::EventSource},
    metrics::Metrics,
    schema::SchemaManager,
};
use std::{future::Future, sync::Arc};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// The loading pipeline: source, parser, batcher, uploads and router.
pub struct Loader {
    source: Arc<dyn EventSource>,
    sink: Arc<dyn BadRowSink>,
    schema: Arc<SchemaManager>,
    channels: Arc<ChannelSwap>,
    metrics: Metrics,
    options: LoaderOptions,
}

impl Loader {
    pub fn new(
        source: Arc<dyn EventSource>,
        sink: Arc<dyn BadRowSink>,
        schema: Arc<SchemaManager>,
        channels: Arc<ChannelSwap>,
        metrics: Metrics,
        options: LoaderOptions,
    ) -> Self {
        Self {
            source,
            sink,
            schema,
            channels,
            metrics,
            options,
        }
    }

    /// Prepares the destination table, then loads until `cancel` fires, the
    /// source ends or a fatal error occurs. Work already handed to the
    /// pipeline is drained before the channel is released.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), LoaderError> {
        self.schema
            .ensure_table_exists()
            .await
            .map_err(LoaderError::Setup)?;

        let result = self.run_pipeline(cancel).await;

        self.channels.close().await;
        match &result {
            Ok(()) => info!(metrics = ?self.metrics.snapshot(), "Loader stopped"),
            Err(err) => error!(error = %err, "Loader failed"),
        }
        result
    }

    async fn run_pipeline(&self, cancel: CancellationToken) -> Result<(), LoaderError> {
        let options = &self.options;
        // Cancelled on fatal errors too, so the producer stops pulling.
        let stop = cancel.child_token();

        let (rows_tx, rows_rx) = mpsc::channel(options.max_pending_events.max(1));
        let (batch_tx, batch_rx) = mpsc::channel(options.upload_concurrency());
        let (router_tx, router_rx) = mpsc::channel(options.max_pending_events.max(1) * 4);

        let parser = EventParser::new(
            options.processor.clone(),
            SchemaFilter::new(&options.schemas_to_skip),
            options.bad_row_max_size,
        );
        let producer = Producer::new(
            self.source.clone(),
            self.sink.clone(),
            parser,
            self.metrics.clone(),
            rows_tx,
            router_tx.clone(),
        );
        let batcher = Batcher::new(options.max_bytes, options.max_delay);
        let writer = BatchWriter::new(
            self.channels.clone(),
            self.schema.clone(),
            self.metrics.clone(),
            options.max_attempts,
        );
        let uploader = Uploader::new(Arc::new(writer), options.upload_concurrency(), router_tx);
        let router = Router::new(
            self.source.clone(),
            self.sink.clone(),
            self.metrics.clone(),
            options.processor.clone(),
            options.bad_row_max_size,
        );

        info!(
            upload_concurrency = options.upload_concurrency(),
            max_bytes = options.max_bytes,
            max_delay_ms = options.max_delay.as_millis() as u64,
            "Starting loader"
        );

        let producer = spawn_stage(&stop, {
            let stop = stop.clone();
            async move { producer.run(stop).await.map(|_| ()) }
        });
        let batcher = spawn_stage(&stop, batcher.run(rows_rx, batch_tx));
        let uploader = spawn_stage(&stop, uploader.run(batch_rx));
        let router = spawn_stage(&stop, router.run(router_rx));

        let (producer, batcher, uploader, router) = tokio::join!(producer, batcher, uploader, router);

        let mut failure: Option<LoaderError> = None;
        for (stage, result) in [
            ("producer", producer),
            ("batcher", batcher),
            ("uploader", uploader),
            ("router", router),
        ] {
            let err = match result {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(join_err) => LoaderError::Task(format!("{stage}: {join_err}")),
            };
            let replace = match &failure {
                None => true,
                Some(existing) => existing.is_secondary() && !err.is_secondary(),
            };
            if replace {
                failure = Some(err);
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Spawns a pipeline stage that cancels `stop` when it fails.
fn spawn_stage<F>(stop: &CancellationToken, stage: F) -> JoinHandle<Result<(), LoaderError>>
where
    F: Future<Output = Result<(), LoaderError>> + Send + 'static,
{
    let stop = stop.clone();
    tokio::spawn(async move {
        let result = stage.await;
        if result.is_err() {
            stop.cancel();
        }
        result
    })
}
