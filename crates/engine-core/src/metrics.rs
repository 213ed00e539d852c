use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    good: AtomicU64,
    bad: AtomicU64,
    latency_millis: AtomicU64,
    batches: AtomicU64,
    swaps: AtomicU64,
    retries: AtomicU64,
    schema_evolutions: AtomicU64,
}

/// Loader counters. Updates are relaxed atomics and never block the caller.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub good: u64,
    pub bad: u64,
    /// Latest observed age of the oldest event in a loaded batch.
    pub latency_millis: u64,
    pub batches: u64,
    pub swaps: u64,
    pub retries: u64,
    pub schema_evolutions: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn add_good(&self, count: u64) {
        self.inner.good.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_bad(&self, count: u64) {
        self.inner.bad.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_latency_millis(&self, millis: u64) {
        self.inner.latency_millis.store(millis, Ordering::Relaxed);
    }

    pub fn add_batches(&self, count: u64) {
        self.inner.batches.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_swaps(&self, count: u64) {
        self.inner.swaps.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_retries(&self, count: u64) {
        self.inner.retries.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_schema_evolutions(&self, count: u64) {
        self.inner
            .schema_evolutions
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            good: self.inner.good.load(Ordering::Relaxed),
            bad: self.inner.bad.load(Ordering::Relaxed),
            latency_millis: self.inner.latency_millis.load(Ordering::Relaxed),
            batches: self.inner.batches.load(Ordering::Relaxed),
            swaps: self.inner.swaps.load(Ordering::Relaxed),
            retries: self.inner.retries.load(Ordering::Relaxed),
            schema_evolutions: self.inner.schema_evolutions.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let metrics = Metrics::new();
        let other = metrics.clone();

        metrics.add_good(3);
        other.add_bad(1);
        other.add_swaps(1);
        metrics.set_latency_millis(250);
        metrics.set_latency_millis(120);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.good, 3);
        assert_eq!(snapshot.bad, 1);
        assert_eq!(snapshot.swaps, 1);
        assert_eq!(snapshot.latency_millis, 120);
    }
}
