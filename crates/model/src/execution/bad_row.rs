use crate::records::row::{Origin, ParsedRow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw event that could not be loaded, on its way to the bad-data sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadRow {
    pub id: String,
    pub processor: String,
    pub stage: FailureStage,
    pub error: String,
    /// The raw event, lossily decoded and cut to the configured maximum size.
    pub payload: String,
    pub truncated: bool,
    pub origin: Option<u64>,
    pub row_index: Option<usize>,
    pub batch_id: Option<String>,
    pub failed_at: DateTime<Utc>,
}

/// Where in the loader the event was rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailureStage {
    /// The event could not be turned into a row.
    Parse,
    /// The destination refused the row.
    Load,
}

impl BadRow {
    pub fn new(
        processor: &str,
        stage: FailureStage,
        raw: &[u8],
        error: impl Into<String>,
        max_size: usize,
    ) -> Self {
        let (payload, truncated) = truncate_payload(raw, max_size);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            processor: processor.to_string(),
            stage,
            error: error.into(),
            payload,
            truncated,
            origin: None,
            row_index: None,
            batch_id: None,
            failed_at: Utc::now(),
        }
    }

    /// Bad row for a parsed row the destination rejected.
    pub fn from_rejected(
        processor: &str,
        row: &ParsedRow,
        batch_id: &str,
        error: impl Into<String>,
        max_size: usize,
    ) -> Self {
        Self::new(processor, FailureStage::Load, &row.raw, error, max_size)
            .with_position(row.origin, row.index)
            .with_batch(batch_id)
    }

    pub fn with_position(mut self, origin: Origin, index: usize) -> Self {
        self.origin = Some(origin.seq());
        self.row_index = Some(index);
        self
    }

    pub fn with_batch(mut self, batch_id: &str) -> Self {
        self.batch_id = Some(batch_id.to_string());
        self
    }
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStage::Parse => write!(f, "Parse"),
            FailureStage::Load => write!(f, "Load"),
        }
    }
}

/// Decodes `raw` as UTF-8 (lossily) and keeps at most `max_size` bytes,
/// cutting on a character boundary.
fn truncate_payload(raw: &[u8], max_size: usize) -> (String, bool) {
    let decoded = String::from_utf8_lossy(raw);
    if decoded.len() <= max_size {
        return (decoded.into_owned(), false);
    }

    let mut end = max_size;
    while !decoded.is_char_boundary(end) {
        end -= 1;
    }
    (decoded[..end].to_string(), true)
}
