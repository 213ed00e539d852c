use async_trait::async_trait;
use engine_core::{connectors::sink::BadRowSink, error::SinkError};
use model::execution::bad_row::BadRow;
use std::path::{Path, PathBuf};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use tracing::debug;

/// Appends bad rows to a local file, one JSON document per line.
pub struct JsonlBadRowSink {
    path: PathBuf,
    // Serializes appends so lines of concurrent batches never interleave.
    lock: Mutex<()>,
}

impl JsonlBadRowSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BadRowSink for JsonlBadRowSink {
    async fn sink_batch(&self, rows: &[BadRow]) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut buffer = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut buffer, row)?;
            buffer.push(b'\n');
        }

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        file.sync_data().await?;

        debug!(path = %self.path.display(), rows = rows.len(), "Wrote bad rows");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::execution::bad_row::FailureStage;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_appends_one_line_per_row() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlBadRowSink::new(dir.path().join("bad").join("rows.jsonl"));

        let first = BadRow::new("p", FailureStage::Parse, b"not json", "invalid", 1024);
        let second = BadRow::new("p", FailureStage::Load, b"{\"a\":1}", "rejected", 1024);
        sink.sink_batch(&[first]).await.unwrap();
        sink.sink_batch(&[second]).await.unwrap();
        sink.sink_batch(&[]).await.unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: BadRow = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.stage, FailureStage::Load);
        assert_eq!(parsed.payload, "{\"a\":1}");
    }
}
