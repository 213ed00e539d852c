use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of leading lines of `file` whose events are fully processed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileOffset {
    pub file: String,
    pub lines_done: u64,
    pub updated_at: DateTime<Utc>,
}

impl FileOffset {
    pub fn new(file: impl Into<String>, lines_done: u64) -> Self {
        Self {
            file: file.into(),
            lines_done,
            updated_at: Utc::now(),
        }
    }
}
