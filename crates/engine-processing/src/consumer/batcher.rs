use crate::error::LoaderError;
use model::records::{batch::Batch, row::ParsedRow};
use std::time::Duration;
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, info};

/// Rows collected since the last flush.
#[derive(Default)]
struct Buffer {
    rows: Vec<ParsedRow>,
    size: usize,
    deadline: Option<Instant>,
}

impl Buffer {
    fn take(&mut self) -> Vec<ParsedRow> {
        self.size = 0;
        self.deadline = None;
        std::mem::take(&mut self.rows)
    }
}

/// Groups parsed rows into batches bounded by size and age.
pub struct Batcher {
    max_bytes: usize,
    max_delay: Duration,
    next_seq: u64,
}

impl Batcher {
    pub fn new(max_bytes: usize, max_delay: Duration) -> Self {
        Self {
            max_bytes: max_bytes.max(1),
            max_delay,
            next_seq: 0,
        }
    }

    /// Runs until `rows_rx` is closed, then flushes what is left.
    pub async fn run(
        mut self,
        mut rows_rx: mpsc::Receiver<Vec<ParsedRow>>,
        batch_tx: mpsc::Sender<Batch>,
    ) -> Result<(), LoaderError> {
        let mut buffer = Buffer::default();

        loop {
            let deadline = buffer.deadline;
            let expired = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                received = rows_rx.recv() => match received {
                    Some(rows) => {
                        for row in rows {
                            self.push(&mut buffer, row, &batch_tx).await?;
                        }
                    }
                    None => {
                        self.flush(&mut buffer, &batch_tx, "input closed").await?;
                        break;
                    }
                },
                _ = expired => self.flush(&mut buffer, &batch_tx, "max delay").await?,
            }
        }

        info!(batches = self.next_seq, "Batcher finished");
        Ok(())
    }

    async fn push(
        &mut self,
        buffer: &mut Buffer,
        row: ParsedRow,
        batch_tx: &mpsc::Sender<Batch>,
    ) -> Result<(), LoaderError> {
        let size = row.size_bytes();
        if !buffer.rows.is_empty() && buffer.size + size > self.max_bytes {
            self.flush(buffer, batch_tx, "max bytes").await?;
        }

        if buffer.rows.is_empty() {
            buffer.deadline = Some(Instant::now() + self.max_delay);
        }
        buffer.size += size;
        buffer.rows.push(row);

        // An oversized row ends up alone in its batch.
        if buffer.size >= self.max_bytes {
            self.flush(buffer, batch_tx, "max bytes").await?;
        }
        Ok(())
    }

    async fn flush(
        &mut self,
        buffer: &mut Buffer,
        batch_tx: &mpsc::Sender<Batch>,
        reason: &'static str,
    ) -> Result<(), LoaderError> {
        if buffer.rows.is_empty() {
            buffer.deadline = None;
            return Ok(());
        }

        let size = buffer.size;
        let batch = Batch::new(self.next_seq, buffer.take());
        self.next_seq += 1;
        debug!(batch_id = %batch.id, rows = batch.len(), bytes = size, reason, "Flushing batch");

        batch_tx
            .send(batch)
            .await
            .map_err(|_| LoaderError::PipelineClosed("uploader"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use model::records::row::Origin;
    use serde_json::Map;

    fn row(index: usize, size: usize) -> ParsedRow {
        ParsedRow::new(
            Origin::new(0),
            index,
            Map::new(),
            Bytes::from(vec![b'x'; size]),
        )
    }

    #[tokio::test]
    async fn test_flushes_when_max_bytes_reached() {
        let (rows_tx, rows_rx) = mpsc::channel(8);
        let (batch_tx, mut batch_rx) = mpsc::channel(8);
        let batcher = tokio::spawn(Batcher::new(100, Duration::from_secs(60)).run(rows_rx, batch_tx));

        rows_tx
            .send(vec![row(0, 40), row(1, 40), row(2, 40)])
            .await
            .unwrap();

        let first = batch_rx.recv().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first.id, "batch-000000");

        drop(rows_tx);
        let rest = batch_rx.recv().await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest.rows[0].index, 2);
        assert!(batch_rx.recv().await.is_none());
        batcher.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_oversized_row_forms_its_own_batch() {
        let (rows_tx, rows_rx) = mpsc::channel(8);
        let (batch_tx, mut batch_rx) = mpsc::channel(8);
        let batcher = tokio::spawn(Batcher::new(100, Duration::from_secs(60)).run(rows_rx, batch_tx));

        rows_tx
            .send(vec![row(0, 10), row(1, 500), row(2, 10)])
            .await
            .unwrap();
        drop(rows_tx);

        let sizes: Vec<usize> = [
            batch_rx.recv().await.unwrap(),
            batch_rx.recv().await.unwrap(),
            batch_rx.recv().await.unwrap(),
        ]
        .iter()
        .map(|b| b.len())
        .collect();
        assert_eq!(sizes, vec![1, 1, 1]);
        batcher.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_flushes_after_max_delay() {
        let (rows_tx, rows_rx) = mpsc::channel(8);
        let (batch_tx, mut batch_rx) = mpsc::channel(8);
        let _batcher = tokio::spawn(
            Batcher::new(1_000_000, Duration::from_millis(20)).run(rows_rx, batch_tx),
        );

        rows_tx.send(vec![row(0, 10)]).await.unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(5), batch_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 1);
        // The input is still open: the flush came from the timer.
        assert!(!rows_tx.is_closed());
    }
}
