use crate::{
    connectors::table::TableManager,
    error::SchemaError,
    retry::{RetryError, RetryPolicy, Transient},
};
use std::{collections::HashSet, future::Future, sync::Arc};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Owns the set of columns known to exist in the destination table.
///
/// The set only grows, and only after the destination confirmed the change.
/// Every operation holds the set's lock for its whole duration, so two
/// evolutions never reach the destination at the same time.
pub struct SchemaManager {
    table: Arc<dyn TableManager>,
    columns: Mutex<HashSet<String>>,
    setup_policy: RetryPolicy,
}

impl SchemaManager {
    pub fn new(table: Arc<dyn TableManager>, setup_policy: RetryPolicy) -> Self {
        Self {
            table,
            columns: Mutex::new(HashSet::new()),
            setup_policy,
        }
    }

    /// Creates the table if needed and loads its current columns. Transient
    /// failures are retried under the setup policy.
    pub fn ensure_table_exists(&self) -> impl Future<Output = Result<(), SchemaError>> + Send + '_ {
        async move {
            let mut columns = self.columns.lock().await;

            let existing = self
                .setup_policy
                .retry("ensure table", move || async move {
                    self.table.create_table_if_missing().await?;
                    self.table.list_columns().await
                })
                .await
                .map_err(exhausted)?;

            columns.extend(existing);
            info!(columns = columns.len(), "Destination table ready");
            Ok(())
        }
    }

    /// Adds the columns not yet known to exist and returns the ones added.
    pub fn add_columns<'a>(
        &'a self,
        names: &'a [String],
    ) -> impl Future<Output = Result<Vec<String>, SchemaError>> + Send + 'a {
        async move {
            let mut columns = self.columns.lock().await;

            let mut novel = Vec::new();
            for name in names {
                if !columns.contains(name) && !novel.contains(name) {
                    novel.push(name.clone());
                }
            }

            if novel.is_empty() {
                return Ok(novel);
            }

            warn!(columns = ?novel, "Evolving destination schema");
            self.table.add_columns(&novel).await?;
            columns.extend(novel.iter().cloned());
            Ok(novel)
        }
    }

    pub fn known_columns(&self) -> impl Future<Output = HashSet<String>> + Send + '_ {
        async move { self.columns.lock().await.clone() }
    }
}

fn exhausted(err: RetryError<SchemaError>) -> SchemaError {
    match err {
        RetryError::Permanent(err) => err,
        RetryError::Exhausted { attempts, last } => SchemaError::RetriesExhausted {
            attempts,
            last_error: last.to_string(),
        },
    }
}

impl Transient for SchemaError {
    fn is_transient(&self) -> bool {
        matches!(self, SchemaError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::{
        sync::Mutex as StdMutex,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[derive(Default)]
    struct FakeTable {
        columns: StdMutex<Vec<String>>,
        add_calls: StdMutex<Vec<Vec<String>>>,
        transient_failures: AtomicUsize,
        reject_ddl: bool,
    }

    #[async_trait]
    impl TableManager for FakeTable {
        async fn create_table_if_missing(&self) -> Result<(), SchemaError> {
            if self.reject_ddl {
                return Err(SchemaError::Rejected("permission denied".into()));
            }
            let remaining = self.transient_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.transient_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(SchemaError::Transport("connection refused".into()));
            }
            let mut columns = self.columns.lock().unwrap();
            if columns.is_empty() {
                columns.push("event_id".to_string());
            }
            Ok(())
        }

        async fn list_columns(&self) -> Result<Vec<String>, SchemaError> {
            Ok(self.columns.lock().unwrap().clone())
        }

        async fn add_columns(&self, names: &[String]) -> Result<(), SchemaError> {
            self.add_calls.lock().unwrap().push(names.to_vec());
            self.columns.lock().unwrap().extend(names.iter().cloned());
            Ok(())
        }
    }

    fn policy(attempts: usize) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(2))
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_ensure_table_seeds_known_columns() {
        let table = Arc::new(FakeTable::default());
        let manager = SchemaManager::new(table.clone(), policy(3));

        manager.ensure_table_exists().await.unwrap();
        assert!(manager.known_columns().await.contains("event_id"));

        let added = manager.add_columns(&names(&["event_id"])).await.unwrap();
        assert!(added.is_empty());
        assert!(table.add_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_table_retries_transient_failures() {
        let table = Arc::new(FakeTable::default());
        table.transient_failures.store(2, Ordering::SeqCst);
        let manager = SchemaManager::new(table, policy(3));

        manager.ensure_table_exists().await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_table_gives_up_after_attempts() {
        let table = Arc::new(FakeTable::default());
        table.transient_failures.store(10, Ordering::SeqCst);
        let manager = SchemaManager::new(table, policy(2));

        let err = manager.ensure_table_exists().await.unwrap_err();
        assert!(matches!(
            err,
            SchemaError::RetriesExhausted { attempts: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let table = Arc::new(FakeTable {
            reject_ddl: true,
            ..Default::default()
        });
        let manager = SchemaManager::new(table, policy(5));

        let err = manager.ensure_table_exists().await.unwrap_err();
        assert!(matches!(err, SchemaError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_add_columns_twice_is_noop_the_second_time() {
        let table = Arc::new(FakeTable::default());
        let manager = SchemaManager::new(table.clone(), policy(1));

        let first = manager.add_columns(&names(&["x", "y", "x"])).await.unwrap();
        let second = manager.add_columns(&names(&["x"])).await.unwrap();

        assert_eq!(first, names(&["x", "y"]));
        assert!(second.is_empty());
        assert_eq!(*table.add_calls.lock().unwrap(), vec![names(&["x", "y"])]);
    }

    #[tokio::test]
    async fn test_concurrent_evolutions_reach_destination_once() {
        let table = Arc::new(FakeTable::default());
        let manager = Arc::new(SchemaManager::new(table.clone(), policy(1)));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                manager.add_columns(&names(&["z"])).await.unwrap()
            }));
        }

        let mut added = 0;
        for task in tasks {
            added += task.await.unwrap().len();
        }
        assert_eq!(added, 1);
        assert_eq!(table.add_calls.lock().unwrap().len(), 1);
    }
}
