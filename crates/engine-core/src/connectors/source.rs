use crate::error::SourceError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use model::records::{event::TokenedBatch, token::Token};
use std::{fmt, time::Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// Upstream source of tokened event batches.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// The infinite stream of batches. It can be started only once; a second
    /// call yields `SourceError::AlreadyStarted`.
    fn stream(&self) -> BoxStream<'static, Result<TokenedBatch, SourceError>>;

    /// Marks the events behind `tokens` as processed. Tokens of different
    /// batches may be checkpointed in any order.
    async fn checkpoint(&self, tokens: &[Token]) -> Result<(), SourceError>;

    /// Unhealthy when events are waiting longer than `max_latency` to be
    /// checkpointed.
    async fn is_healthy(&self, max_latency: Duration) -> HealthStatus;
}
