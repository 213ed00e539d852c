use engine_core::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Write attempts per batch before the loader gives up.
    pub max_attempts: usize,
    pub setup_base_delay_ms: u64,
    pub setup_max_delay_ms: u64,
    /// Attempts for table creation at startup.
    pub setup_attempts: usize,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            setup_base_delay_ms: 250,
            setup_max_delay_ms: 5_000,
            setup_attempts: 5,
        }
    }
}

impl RetrySettings {
    pub fn setup_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.setup_attempts,
            Duration::from_millis(self.setup_base_delay_ms),
            Duration::from_millis(self.setup_max_delay_ms),
        )
    }
}
