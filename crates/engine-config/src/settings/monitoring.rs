use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    /// The source is reported unhealthy once an event waits longer than this.
    pub max_latency_ms: u64,
    pub health_interval_ms: u64,
    pub report_interval_ms: u64,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            max_latency_ms: 300_000,
            health_interval_ms: 60_000,
            report_interval_ms: 60_000,
        }
    }
}

impl MonitoringSettings {
    pub fn max_latency(&self) -> Duration {
        Duration::from_millis(self.max_latency_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}
