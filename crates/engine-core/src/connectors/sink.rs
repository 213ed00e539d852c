use crate::error::SinkError;
use async_trait::async_trait;
use model::execution::bad_row::BadRow;

/// Side channel receiving events that will never be loaded.
#[async_trait]
pub trait BadRowSink: Send + Sync {
    /// Returns once the rows are durably handed over.
    async fn sink_batch(&self, rows: &[BadRow]) -> Result<(), SinkError>;
}
