use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationSettings {
    /// Postgres connection string; `sslmode` is honoured.
    pub url: String,
    pub schema: String,
    pub table: String,
}

impl Default for DestinationSettings {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/postgres".to_string(),
            schema: "public".to_string(),
            table: "events".to_string(),
        }
    }
}

impl DestinationSettings {
    /// `"schema"."table"`, for use in statements.
    pub fn qualified_table(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.table)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Directory scanned for `*.jsonl` files.
    pub path: PathBuf,
    /// Lines per tokened batch.
    pub batch_lines: usize,
    /// Where committed read offsets are kept.
    pub state_dir: PathBuf,
    /// Keep polling for appended lines and new files instead of stopping
    /// once everything present has been read.
    pub follow: bool,
    pub poll_interval_ms: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./events"),
            batch_lines: 500,
            state_dir: PathBuf::from("./.streamload/state"),
            follow: true,
            poll_interval_ms: 1000,
        }
    }
}

impl SourceSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BadRowSettings {
    pub path: PathBuf,
}

impl Default for BadRowSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./bad/bad_rows.jsonl"),
        }
    }
}
