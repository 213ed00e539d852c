use crate::records::row::{Origin, ParsedRow};
use std::collections::BTreeMap;

/// Rows flushed together to the destination in one write.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: String,
    pub rows: Vec<ParsedRow>,
    pub ts: chrono::DateTime<chrono::Utc>,
}

impl Batch {
    pub fn new(seq: u64, rows: Vec<ParsedRow>) -> Self {
        Self {
            id: format!("batch-{seq:06}"),
            rows,
            ts: chrono::Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.rows.iter().map(|r| r.size_bytes()).sum()
    }

    /// Number of rows each tokened batch contributed.
    pub fn origin_counts(&self) -> BTreeMap<Origin, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.origin).or_insert(0) += 1;
        }
        counts
    }
}
