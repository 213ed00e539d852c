use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingSettings {
    /// Upper bound on the raw size of a batch. A single larger event still
    /// goes out, alone.
    pub max_bytes: usize,
    /// How long a batch may wait for more rows after its first one.
    pub max_delay_ms: u64,
    /// Batches written to the destination at the same time.
    pub upload_concurrency: usize,
}

impl Default for BatchingSettings {
    fn default() -> Self {
        Self {
            max_bytes: 16_000_000,
            max_delay_ms: 1_000,
            upload_concurrency: 3,
        }
    }
}

impl BatchingSettings {
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}
