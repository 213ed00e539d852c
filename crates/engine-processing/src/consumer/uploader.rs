use crate::{
    consumer::{router::RouterMessage, writer::BatchWriter},
    error::LoaderError,
};
use model::records::batch::Batch;
use std::sync::Arc;
use tokio::{
    sync::{Semaphore, mpsc},
    task::JoinSet,
};
use tracing::{error, info};

/// Hands flushed batches to writer tasks, at most `concurrency` at a time,
/// and reports each resolved batch to the router.
pub struct Uploader {
    writer: Arc<BatchWriter>,
    permits: Arc<Semaphore>,
    router_tx: mpsc::Sender<RouterMessage>,
}

impl Uploader {
    pub fn new(
        writer: Arc<BatchWriter>,
        concurrency: usize,
        router_tx: mpsc::Sender<RouterMessage>,
    ) -> Self {
        Self {
            writer,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            router_tx,
        }
    }

    /// Runs until the batch channel closes or an upload fails. In-flight
    /// uploads are always awaited before returning.
    pub async fn run(self, mut batch_rx: mpsc::Receiver<Batch>) -> Result<(), LoaderError> {
        let mut tasks: JoinSet<Result<(), LoaderError>> = JoinSet::new();
        let mut failure: Option<LoaderError> = None;

        loop {
            // Upload results are collected while waiting for the next batch.
            let batch = tokio::select! {
                biased;
                Some(done) = tasks.join_next(), if !tasks.is_empty() => {
                    record(&mut failure, done);
                    if failure.is_some() {
                        break;
                    }
                    continue;
                }
                next = batch_rx.recv() => match next {
                    Some(batch) => batch,
                    None => break,
                },
            };

            let permit = self
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| LoaderError::PipelineClosed("upload permits"))?;

            while let Some(done) = tasks.try_join_next() {
                record(&mut failure, done);
            }
            if failure.is_some() {
                break;
            }

            let writer = self.writer.clone();
            let router_tx = self.router_tx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let resolved = writer.write_batch(batch).await?;
                router_tx
                    .send(RouterMessage::Resolved(resolved))
                    .await
                    .map_err(|_| LoaderError::PipelineClosed("router"))
            });
        }

        // Stop taking batches so the batcher notices if we bailed out early.
        batch_rx.close();

        while let Some(done) = tasks.join_next().await {
            record(&mut failure, done);
        }

        match failure {
            Some(err) => Err(err),
            None => {
                info!("Uploader finished");
                Ok(())
            }
        }
    }
}

/// Keeps the first primary error; errors caused by another stage closing only
/// win when nothing better was seen.
fn record(
    failure: &mut Option<LoaderError>,
    done: Result<Result<(), LoaderError>, tokio::task::JoinError>,
) {
    let err = match done {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err,
        Err(join_err) => LoaderError::Task(join_err.to_string()),
    };

    error!(error = %err, "Upload failed");
    let replace = match failure.as_ref() {
        None => true,
        Some(existing) => existing.is_secondary() && !err.is_secondary(),
    };
    if replace {
        *failure = Some(err);
    }
}
