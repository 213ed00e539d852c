use crate::error::RuntimeError;
use connectors::{
    file::{bad_rows::JsonlBadRowSink, jsonl::JsonlSource},
    sql::postgres::{PgChannelFactory, PgTableManager},
};
use engine_config::settings::LoaderConfig;
use engine_core::{
    coldswap::Coldswap,
    connectors::{
        channel::{ChannelFactory, ChannelSwap},
        sink::BadRowSink,
        source::EventSource,
    },
    schema::SchemaManager,
    state::{OffsetStore, sled_store::SledOffsetStore},
};
use std::sync::Arc;
use tracing::info;

pub fn create_offset_store(config: &LoaderConfig) -> Result<Arc<dyn OffsetStore>, RuntimeError> {
    let path = &config.source.state_dir;
    std::fs::create_dir_all(path).map_err(|e| {
        RuntimeError::InitializationError(format!(
            "Failed to create state directory {}: {e}",
            path.display()
        ))
    })?;
    let store = SledOffsetStore::open(path)?;
    info!(path = %path.display(), "Opened offset store");
    Ok(Arc::new(store))
}

pub fn create_source(
    config: &LoaderConfig,
    offsets: Arc<dyn OffsetStore>,
) -> Result<Arc<dyn EventSource>, RuntimeError> {
    let settings = &config.source;
    if !settings.path.is_dir() {
        return Err(RuntimeError::InitializationError(format!(
            "Source directory {} does not exist",
            settings.path.display()
        )));
    }

    let source = JsonlSource::new(
        settings.path.clone(),
        settings.batch_lines,
        settings.follow,
        offsets,
    )
    .with_poll_interval(settings.poll_interval());
    Ok(Arc::new(source))
}

pub fn create_sink(config: &LoaderConfig) -> Arc<dyn BadRowSink> {
    Arc::new(JsonlBadRowSink::new(config.bad_rows.path.clone()))
}

pub fn create_schema_manager(config: &LoaderConfig) -> Result<Arc<SchemaManager>, RuntimeError> {
    let destination = &config.destination;
    let table = PgTableManager::new(
        destination.url.clone(),
        &destination.schema,
        &destination.table,
    )?;
    Ok(Arc::new(SchemaManager::new(
        Arc::new(table),
        config.retries.setup_policy(),
    )))
}

pub fn create_channels(config: &LoaderConfig) -> Arc<ChannelSwap> {
    let destination = &config.destination;
    let factory: Arc<ChannelFactory> = Arc::new(PgChannelFactory::new(
        destination.url.clone(),
        destination.schema.clone(),
        destination.table.clone(),
    ));
    Arc::new(Coldswap::new(factory))
}
