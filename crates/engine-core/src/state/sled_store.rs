use crate::{
    error::StateStoreError,
    state::{OffsetStore, models::FileOffset},
};
use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;

const OFFSETS_TREE: &str = "offsets";

pub struct SledOffsetStore {
    db: sled::Db,
    offsets: sled::Tree,
}

impl SledOffsetStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateStoreError> {
        let db = sled::open(path).map_err(|e| StateStoreError::Open(e.to_string()))?;
        let offsets = db
            .open_tree(OFFSETS_TREE)
            .map_err(|e| StateStoreError::Open(e.to_string()))?;
        Ok(Self { db, offsets })
    }

    #[inline]
    fn key(file: &str) -> String {
        format!("off:{file}")
    }
}

#[async_trait]
impl OffsetStore for SledOffsetStore {
    async fn save_offset(&self, offset: &FileOffset) -> Result<(), StateStoreError> {
        let key = Self::key(&offset.file);
        let new_bytes =
            bincode::serialize(offset).map_err(|e| StateStoreError::SaveOffset(e.to_string()))?;

        // Check-then-set in one transaction so a stale writer cannot move the
        // offset backwards.
        let result = self.offsets.transaction(|tx| {
            if let Some(existing_bytes) = tx.get(key.as_bytes())? {
                let existing: FileOffset = bincode::deserialize(&existing_bytes)
                    .map_err(|e| ConflictableTransactionError::Abort(e.to_string()))?;
                if existing.lines_done >= offset.lines_done {
                    return Ok(());
                }
            }

            tx.insert(key.as_bytes(), new_bytes.as_slice())?;
            Ok(())
        });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(e)) => return Err(StateStoreError::SaveOffset(e)),
            Err(TransactionError::Storage(e)) => {
                return Err(StateStoreError::SaveOffset(e.to_string()));
            }
        }

        self.db
            .flush_async()
            .await
            .map_err(|e| StateStoreError::SaveOffset(e.to_string()))?;
        Ok(())
    }

    async fn load_offset(&self, file: &str) -> Result<Option<FileOffset>, StateStoreError> {
        let bytes = self
            .offsets
            .get(Self::key(file))
            .map_err(|e| StateStoreError::LoadOffset(e.to_string()))?;

        match bytes {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StateStoreError::LoadOffset(e.to_string())),
            None => Ok(None),
        }
    }

    async fn load_all(&self) -> Result<Vec<FileOffset>, StateStoreError> {
        let mut offsets = Vec::new();
        for item in self.offsets.scan_prefix("off:") {
            let (_key, value) = item.map_err(|e| StateStoreError::LoadOffset(e.to_string()))?;
            let offset: FileOffset = bincode::deserialize(&value)
                .map_err(|e| StateStoreError::LoadOffset(e.to_string()))?;
            offsets.push(offset);
        }
        Ok(offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_offset_never_moves_backwards() {
        let dir = tempdir().unwrap();
        let store = SledOffsetStore::open(dir.path()).unwrap();

        store
            .save_offset(&FileOffset::new("a.jsonl", 500))
            .await
            .unwrap();
        // A late acknowledgement for an earlier range must not rewind.
        store
            .save_offset(&FileOffset::new("a.jsonl", 200))
            .await
            .unwrap();

        let offset = store.load_offset("a.jsonl").await.unwrap().unwrap();
        assert_eq!(offset.lines_done, 500);
    }

    #[tokio::test]
    async fn test_offsets_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = SledOffsetStore::open(dir.path()).unwrap();
            store
                .save_offset(&FileOffset::new("a.jsonl", 10))
                .await
                .unwrap();
            store
                .save_offset(&FileOffset::new("b.jsonl", 3))
                .await
                .unwrap();
        }

        let store = SledOffsetStore::open(dir.path()).unwrap();
        let mut all = store.load_all().await.unwrap();
        all.sort_by(|a, b| a.file.cmp(&b.file));

        assert_eq!(all.len(), 2);
        assert_eq!(all[0].lines_done, 10);
        assert_eq!(all[1].file, "b.jsonl");
        assert!(store.load_offset("c.jsonl").await.unwrap().is_none());
    }
}
