use bytes::Bytes;
use engine_core::{error::SourceError, state::OffsetStore};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};
use tracing::{debug, info};

const EXTENSION: &str = "jsonl";

/// Lines `start..end` of `file`. Blank lines count towards the range but
/// carry no event.
#[derive(Debug)]
pub struct Chunk {
    pub file: String,
    pub start: u64,
    pub end: u64,
    pub events: Vec<Bytes>,
}

struct OpenFile {
    name: String,
    reader: BufReader<File>,
    line_no: u64,
    /// Bytes of a line whose newline has not been written yet.
    partial: Vec<u8>,
    /// Set once the file is known to be complete: a later file exists or the
    /// source does not follow.
    draining: bool,
}

impl OpenFile {
    /// The next complete line, or `None` at the current end of the file.
    async fn read_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        self.reader.read_until(b'\n', &mut self.partial).await?;
        if self.partial.last() != Some(&b'\n') {
            return Ok(None);
        }

        let mut line = std::mem::take(&mut self.partial);
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    fn take_partial(&mut self) -> Option<Vec<u8>> {
        (!self.partial.is_empty()).then(|| std::mem::take(&mut self.partial))
    }
}

/// Reads `*.jsonl` files of a directory in name order, resuming each file
/// after its committed offset.
pub struct JsonlReader {
    dir: PathBuf,
    batch_lines: u64,
    follow: bool,
    offsets: Arc<dyn OffsetStore>,
    current: Option<OpenFile>,
    finished: HashSet<String>,
}

impl JsonlReader {
    pub fn new(
        dir: impl Into<PathBuf>,
        batch_lines: usize,
        follow: bool,
        offsets: Arc<dyn OffsetStore>,
    ) -> Self {
        Self {
            dir: dir.into(),
            batch_lines: batch_lines.max(1) as u64,
            follow,
            offsets,
            current: None,
            finished: HashSet::new(),
        }
    }

    /// The next chunk of lines. `None` means nothing is available right now;
    /// without follow mode it means every file has been read.
    pub async fn next_batch(&mut self) -> Result<Option<Chunk>, SourceError> {
        loop {
            if self.current.is_none() && !self.open_next().await? {
                return Ok(None);
            }
            let later_exists = match &self.current {
                Some(file) => self.has_later_file(&file.name).await?,
                None => return Ok(None),
            };
            let Some(file) = self.current.as_mut() else {
                return Ok(None);
            };

            let start = file.line_no;
            let mut events = Vec::new();
            while file.line_no - start < self.batch_lines {
                match file.read_line().await? {
                    Some(line) => {
                        file.line_no += 1;
                        push_event(&mut events, line);
                    }
                    None => break,
                }
            }

            if file.line_no == start && file.draining {
                if let Some(line) = file.take_partial() {
                    file.line_no += 1;
                    push_event(&mut events, line);
                }
            }

            if file.line_no > start {
                return Ok(Some(Chunk {
                    file: file.name.clone(),
                    start,
                    end: file.line_no,
                    events,
                }));
            }

            if file.draining {
                info!(file = %file.name, lines = file.line_no, "Finished reading file");
                self.finished.insert(file.name.clone());
                self.current = None;
                continue;
            }

            if later_exists || !self.follow {
                // Read once more before giving the file up.
                file.draining = true;
                continue;
            }

            return Ok(None);
        }
    }

    async fn list_files(&self) -> Result<Vec<String>, SourceError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn has_later_file(&self, name: &str) -> Result<bool, SourceError> {
        Ok(self
            .list_files()
            .await?
            .iter()
            .any(|other| other.as_str() > name))
    }

    /// Opens the first unfinished file and skips its committed lines.
    async fn open_next(&mut self) -> Result<bool, SourceError> {
        let Some(name) = self
            .list_files()
            .await?
            .into_iter()
            .find(|name| !self.finished.contains(name))
        else {
            return Ok(false);
        };

        let committed = self
            .offsets
            .load_offset(&name)
            .await
            .map_err(|e| SourceError::Read(Box::new(e)))?
            .map(|offset| offset.lines_done)
            .unwrap_or(0);

        let file = File::open(self.path(&name)).await?;
        let mut file = OpenFile {
            name,
            reader: BufReader::new(file),
            line_no: 0,
            partial: Vec::new(),
            draining: false,
        };

        while file.line_no < committed {
            if file.read_line().await?.is_some() {
                file.line_no += 1;
                continue;
            }
            // A committed final line that never got its newline.
            if file.line_no + 1 == committed && file.take_partial().is_some() {
                file.line_no += 1;
            }
            break;
        }

        debug!(file = %file.name, skipped = file.line_no, "Opened file");
        self.current = Some(file);
        Ok(true)
    }

    fn path(&self, name: &str) -> PathBuf {
        Path::new(&self.dir).join(name)
    }
}

fn push_event(events: &mut Vec<Bytes>, line: Vec<u8>) {
    if !line.iter().all(u8::is_ascii_whitespace) {
        events.push(Bytes::from(line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::state::{models::FileOffset, sled_store::SledOffsetStore};
    use std::io::Write;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> Arc<dyn OffsetStore> {
        Arc::new(SledOffsetStore::open(dir.path().join("state")).unwrap())
    }

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn test_reads_files_in_name_order() {
        let state = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        write_file(data.path(), "b.jsonl", "{\"n\":3}\n");
        write_file(data.path(), "a.jsonl", "{\"n\":1}\n\n{\"n\":2}\n");
        write_file(data.path(), "ignored.txt", "nope\n");

        let mut reader = JsonlReader::new(data.path(), 10, false, store(&state));

        let first = reader.next_batch().await.unwrap().unwrap();
        assert_eq!(first.file, "a.jsonl");
        assert_eq!((first.start, first.end), (0, 3));
        assert_eq!(first.events.len(), 2);

        let second = reader.next_batch().await.unwrap().unwrap();
        assert_eq!(second.file, "b.jsonl");
        assert_eq!(second.events, vec![Bytes::from("{\"n\":3}")]);

        assert!(reader.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_splits_by_batch_lines_and_keeps_unterminated_tail() {
        let state = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        write_file(data.path(), "a.jsonl", "1\n2\n3\n4");

        let mut reader = JsonlReader::new(data.path(), 2, false, store(&state));

        let first = reader.next_batch().await.unwrap().unwrap();
        assert_eq!((first.start, first.end), (0, 2));
        let second = reader.next_batch().await.unwrap().unwrap();
        assert_eq!((second.start, second.end), (2, 3));
        let tail = reader.next_batch().await.unwrap().unwrap();
        assert_eq!((tail.start, tail.end), (3, 4));
        assert_eq!(tail.events, vec![Bytes::from("4")]);
        assert!(reader.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resumes_after_committed_offset() {
        let state = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        write_file(data.path(), "a.jsonl", "1\n2\n3\n");

        let offsets = store(&state);
        offsets
            .save_offset(&FileOffset::new("a.jsonl", 2))
            .await
            .unwrap();

        let mut reader = JsonlReader::new(data.path(), 10, false, offsets);
        let chunk = reader.next_batch().await.unwrap().unwrap();
        assert_eq!((chunk.start, chunk.end), (2, 3));
        assert_eq!(chunk.events, vec![Bytes::from("3")]);
    }

    #[tokio::test]
    async fn test_follow_mode_waits_for_newline() {
        let state = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        write_file(data.path(), "a.jsonl", "1\n2");

        let mut reader = JsonlReader::new(data.path(), 10, true, store(&state));
        let chunk = reader.next_batch().await.unwrap().unwrap();
        assert_eq!(chunk.end, 1);
        assert!(reader.next_batch().await.unwrap().is_none());

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(data.path().join("a.jsonl"))
            .unwrap();
        file.write_all(b"2\n").unwrap();

        let chunk = reader.next_batch().await.unwrap().unwrap();
        assert_eq!((chunk.start, chunk.end), (1, 2));
        assert_eq!(chunk.events, vec![Bytes::from("22")]);
    }
}
