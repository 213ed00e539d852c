use engine_core::error::{ChannelError, SchemaError, SinkError, SourceError};
use thiserror::Error;

/// Fatal errors of the loading pipeline. Any of these stops the loader
/// without checkpointing rows that were not fully resolved.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Bad row sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Failed to prepare destination table: {0}")]
    Setup(#[source] SchemaError),

    #[error("Schema evolution failed for batch '{batch_id}': {source}")]
    SchemaEvolution {
        batch_id: String,
        #[source]
        source: SchemaError,
    },

    #[error("Batch '{batch_id}' still had {unresolved} unresolved rows after {attempts} attempts")]
    RetriesExhausted {
        batch_id: String,
        attempts: usize,
        unresolved: usize,
    },

    #[error("Pipeline stage '{0}' stopped unexpectedly")]
    PipelineClosed(&'static str),

    #[error("Loader task failed: {0}")]
    Task(String),
}

impl LoaderError {
    /// Whether the error only reports that another stage went away first.
    pub fn is_secondary(&self) -> bool {
        matches!(self, LoaderError::PipelineClosed(_))
    }
}

/// Why a raw event could not be turned into a row.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Event is a JSON {0}, expected an object")]
    NotAnObject(&'static str),

    #[error("Keys '{first}' and '{second}' both map to column '{column}'")]
    ColumnCollision {
        column: String,
        first: String,
        second: String,
    },
}
