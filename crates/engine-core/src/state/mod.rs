use crate::{error::StateStoreError, state::models::FileOffset};
use async_trait::async_trait;

pub mod models;
pub mod sled_store;

/// Durable per-file read positions of the file source.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Records the offset unless a later one is already stored.
    async fn save_offset(&self, offset: &FileOffset) -> Result<(), StateStoreError>;

    async fn load_offset(&self, file: &str) -> Result<Option<FileOffset>, StateStoreError>;

    async fn load_all(&self) -> Result<Vec<FileOffset>, StateStoreError>;
}
