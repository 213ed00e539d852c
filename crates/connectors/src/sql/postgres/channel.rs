use crate::sql::postgres::utils::{
    checked_ident, connect_client, describe, is_connection_error, qualified_table,
};
use async_trait::async_trait;
use engine_core::{
    coldswap::ResourceFactory,
    connectors::channel::{Channel, WriteChannel},
    error::ChannelError,
};
use model::{
    execution::outcome::{RowFailure, WriteOutcome},
    records::row::ParsedRow,
};
use std::{
    collections::HashSet,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::sync::Mutex;
use tokio_postgres::Client;
use tracing::{debug, info, warn};

const INSERT_ROW_SQL: &str = include_str!("sql/insert_row.sql");
const LIST_COLUMNS_SQL: &str = include_str!("sql/list_columns.sql");

/// A write session bound to the destination table.
///
/// The table's columns are read once when the channel opens. Rows carrying
/// other columns are reported as missing-column failures without being sent;
/// after the schema is evolved a fresh channel sees the new columns.
pub struct PgChannel {
    client: Mutex<Client>,
    columns: HashSet<String>,
    insert_sql: String,
    invalid: AtomicBool,
}

enum RowResult {
    Inserted,
    Rejected(String),
}

/// Why an insert attempt as a whole did not go through.
enum AttemptFailure {
    /// The session is unusable; nothing from the attempt was committed.
    Invalidated(tokio_postgres::Error),
    Failed(tokio_postgres::Error),
}

impl From<tokio_postgres::Error> for AttemptFailure {
    fn from(err: tokio_postgres::Error) -> Self {
        if is_connection_error(&err) {
            AttemptFailure::Invalidated(err)
        } else {
            AttemptFailure::Failed(err)
        }
    }
}

impl PgChannel {
    pub async fn open(url: &str, schema: &str, table: &str) -> Result<Self, ChannelError> {
        let (schema, table) = match (checked_ident(schema), checked_ident(table)) {
            (Some(schema), Some(table)) => (schema, table),
            _ => {
                return Err(ChannelError::Open(
                    format!("invalid destination '{schema}.{table}'").into(),
                ));
            }
        };

        let client = connect_client(url)
            .await
            .map_err(|e| ChannelError::Open(Box::new(e)))?;

        let rows = client
            .query(LIST_COLUMNS_SQL, &[&schema, &table])
            .await
            .map_err(|e| ChannelError::Open(Box::new(e)))?;
        let columns = rows
            .iter()
            .map(|row| row.try_get::<_, String>(0))
            .collect::<Result<HashSet<_>, _>>()
            .map_err(|e| ChannelError::Open(Box::new(e)))?;

        debug!(columns = columns.len(), "Opened write channel");
        Ok(Self {
            client: Mutex::new(client),
            columns,
            insert_sql: INSERT_ROW_SQL.replace("{table}", &qualified_table(schema, table)),
            invalid: AtomicBool::new(false),
        })
    }

    fn invalidate(&self, err: &tokio_postgres::Error) -> WriteOutcome {
        warn!(error = %err, "Write channel invalidated");
        self.invalid.store(true, Ordering::SeqCst);
        WriteOutcome::ChannelInvalid
    }

    /// Inserts `rows[i]` for every `i` in `sendable` in one transaction, each
    /// under its own savepoint.
    async fn insert(
        &self,
        rows: &[ParsedRow],
        sendable: &[usize],
    ) -> Result<Vec<(usize, RowResult)>, AttemptFailure> {
        let mut client = self.client.lock().await;
        let mut tx = client.transaction().await?;
        let statement = tx.prepare(&self.insert_sql).await?;

        let mut results = Vec::with_capacity(sendable.len());
        for &index in sendable {
            let payload = rows[index].to_json();
            let savepoint = tx.savepoint("row").await?;
            match savepoint.execute(&statement, &[&payload]).await {
                Ok(_) => {
                    savepoint.commit().await?;
                    results.push((index, RowResult::Inserted));
                }
                Err(err) if is_connection_error(&err) => {
                    return Err(AttemptFailure::Invalidated(err));
                }
                Err(err) => {
                    savepoint.rollback().await?;
                    results.push((index, RowResult::Rejected(describe(&err))));
                }
            }
        }

        // A failed COMMIT leaves the outcome of every row unknown.
        tx.commit().await.map_err(AttemptFailure::Invalidated)?;
        Ok(results)
    }
}

#[async_trait]
impl WriteChannel for PgChannel {
    async fn write(&self, rows: &[ParsedRow]) -> Result<WriteOutcome, ChannelError> {
        if self.invalid.load(Ordering::SeqCst) {
            return Ok(WriteOutcome::ChannelInvalid);
        }

        let mut failures = Vec::new();
        let mut sendable = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let unknown = row.unknown_columns(&self.columns);
            if unknown.is_empty() {
                sendable.push(index);
            } else {
                failures.push(RowFailure::missing_columns(index, unknown));
            }
        }

        if !sendable.is_empty() {
            match self.insert(rows, &sendable).await {
                Ok(results) => {
                    for (index, result) in results {
                        if let RowResult::Rejected(message) = result {
                            failures.push(RowFailure::other(index, message));
                        }
                    }
                }
                Err(AttemptFailure::Invalidated(err)) => return Ok(self.invalidate(&err)),
                Err(AttemptFailure::Failed(err)) => return Err(ChannelError::Write(Box::new(err))),
            }
        }

        failures.sort_by_key(|f| f.index);
        Ok(WriteOutcome::from_failures(failures))
    }
}

/// Opens [`PgChannel`]s for the channel [`Coldswap`](engine_core::coldswap::Coldswap).
pub struct PgChannelFactory {
    url: String,
    schema: String,
    table: String,
}

impl PgChannelFactory {
    pub fn new(url: impl Into<String>, schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }
}

#[async_trait]
impl ResourceFactory for PgChannelFactory {
    type Resource = Channel;
    type Error = ChannelError;

    async fn open(&self) -> Result<Channel, ChannelError> {
        let channel = PgChannel::open(&self.url, &self.schema, &self.table).await?;
        info!(schema = %self.schema, table = %self.table, "Write channel opened");
        Ok(Box::new(channel))
    }

    async fn release(&self, channel: Channel) {
        // Dropping the client ends the session.
        drop(channel);
        debug!("Write channel released");
    }
}
