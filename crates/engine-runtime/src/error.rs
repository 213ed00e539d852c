use engine_config::error::ConfigError;
use engine_core::error::{SchemaError, StateStoreError};
use engine_processing::error::LoaderError;
use thiserror::Error;

/// Top-level errors of a loader run.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    /// Offset store could not be opened.
    #[error("State store error: {0}")]
    State(#[from] StateStoreError),

    #[error("Destination setup error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    /// An error occurred while joining a background task.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}
