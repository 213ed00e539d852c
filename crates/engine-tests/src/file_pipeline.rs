#[cfg(test)]
mod tests {
    use crate::{
        mocks::{ActionLog, MockChannelFactory, MockTableManager},
        utils::{BASE_COLUMNS, event, test_options},
    };
    use connectors::file::{bad_rows::JsonlBadRowSink, jsonl::JsonlSource};
    use engine_core::{
        coldswap::Coldswap,
        connectors::channel::ChannelFactory,
        metrics::Metrics,
        retry::RetryPolicy,
        schema::SchemaManager,
        state::{OffsetStore, sled_store::SledOffsetStore},
    };
    use engine_processing::Loader;
    use std::{path::Path, sync::Arc, time::Duration};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    /// Loads every file under `events` once, against a mock destination.
    async fn load_directory(
        events: &Path,
        offsets: Arc<dyn OffsetStore>,
        bad_rows: &Path,
        log: &ActionLog,
    ) -> Metrics {
        let table = Arc::new(MockTableManager::new(log.clone(), BASE_COLUMNS));
        let factory: Arc<ChannelFactory> =
            Arc::new(MockChannelFactory::new(log.clone()).bound_to(table.clone()));
        let schema = Arc::new(SchemaManager::new(
            table,
            RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1)),
        ));
        let metrics = Metrics::new();

        let loader = Loader::new(
            Arc::new(JsonlSource::new(events, 2, false, offsets)),
            Arc::new(JsonlBadRowSink::new(bad_rows)),
            schema,
            Arc::new(Coldswap::new(factory)),
            metrics.clone(),
            test_options(),
        );
        loader.run(CancellationToken::new()).await.unwrap();
        metrics
    }

    #[traced_test]
    #[tokio::test]
    async fn file_source_loads_once_and_resumes_from_offsets() {
        let events = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        let bad_rows = state.path().join("bad").join("rows.jsonl");

        let mut lines: Vec<String> = ["e1", "e2", "e3"]
            .iter()
            .map(|id| event(id).to_string())
            .collect();
        lines.insert(1, "{not json".to_string());
        std::fs::write(events.path().join("0001.jsonl"), lines.join("\n") + "\n").unwrap();

        let offsets: Arc<dyn OffsetStore> =
            Arc::new(SledOffsetStore::open(state.path().join("offsets")).unwrap());

        let log = ActionLog::new();
        let metrics = load_directory(events.path(), offsets.clone(), &bad_rows, &log).await;

        let snapshot = metrics.snapshot();
        assert_eq!((snapshot.good, snapshot.bad), (3, 1));
        assert_eq!(log.writes().iter().map(Vec::len).sum::<usize>(), 3);

        let bad = std::fs::read_to_string(&bad_rows).unwrap();
        assert_eq!(bad.lines().count(), 1);
        assert!(bad.contains("{not json"));

        let offset = offsets.load_offset("0001.jsonl").await.unwrap().unwrap();
        assert_eq!(offset.lines_done, 4);

        // A second run over the same state has nothing left to load.
        let log = ActionLog::new();
        let metrics = load_directory(events.path(), offsets, &bad_rows, &log).await;
        assert_eq!(metrics.snapshot().good, 0);
        assert!(log.writes().is_empty());
    }
}
