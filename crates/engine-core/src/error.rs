use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by a write channel outside of its `WriteOutcome` contract.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Failed to open channel: {0}")]
    Open(#[source] BoxError),

    #[error("Channel write failed: {0}")]
    Write(#[source] BoxError),
}

#[derive(Error, Debug)]
pub enum SchemaError {
    /// The destination could not be reached or the statement failed transiently.
    #[error("Schema transport error: {0}")]
    Transport(#[source] BoxError),

    /// The destination refused the change (permissions, bad configuration).
    #[error("Schema change rejected: {0}")]
    Rejected(String),

    #[error("Schema operation still failing after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: usize, last_error: String },
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read from source: {0}")]
    Read(#[source] BoxError),

    #[error("Failed to checkpoint tokens: {0}")]
    Checkpoint(#[source] BoxError),

    #[error("Unknown token: {0}")]
    UnknownToken(u64),

    #[error("Source stream was already started")]
    AlreadyStarted,
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Read(Box::new(err))
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to write bad rows: {0}")]
    Write(#[from] std::io::Error),

    #[error("Failed to serialize bad row: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Bad row sink unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("Failed to open state store: {0}")]
    Open(String),

    #[error("Failed to save offset: {0}")]
    SaveOffset(String),

    #[error("Failed to load offset: {0}")]
    LoadOffset(String),
}
