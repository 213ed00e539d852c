use crate::sql::postgres::utils::{
    checked_ident, connect_client, describe, is_connection_error, qualified_table, quote_ident,
};
use async_trait::async_trait;
use engine_core::{connectors::table::TableManager, error::SchemaError};
use tokio::sync::{Mutex, MutexGuard};
use tokio_postgres::Client;
use tracing::{debug, info, warn};

const CREATE_TABLE_SQL: &str = include_str!("sql/create_table.sql");
const LIST_COLUMNS_SQL: &str = include_str!("sql/list_columns.sql");

/// DDL against the destination table over a dedicated session. The session
/// is re-established on the next call after a connection failure.
pub struct PgTableManager {
    url: String,
    schema: String,
    table: String,
    client: Mutex<Option<Client>>,
}

impl PgTableManager {
    pub fn new(url: impl Into<String>, schema: &str, table: &str) -> Result<Self, SchemaError> {
        let schema = checked_ident(schema)
            .ok_or_else(|| SchemaError::Rejected(format!("invalid schema name '{schema}'")))?;
        let table = checked_ident(table)
            .ok_or_else(|| SchemaError::Rejected(format!("invalid table name '{table}'")))?;

        Ok(Self {
            url: url.into(),
            schema: schema.to_string(),
            table: table.to_string(),
            client: Mutex::new(None),
        })
    }

    fn qualified(&self) -> String {
        qualified_table(&self.schema, &self.table)
    }

    /// The session, connecting first if needed.
    async fn session(&self) -> Result<MutexGuard<'_, Option<Client>>, SchemaError> {
        let mut guard = self.client.lock().await;
        if guard.is_none() {
            let client = connect_client(&self.url)
                .await
                .map_err(|e| SchemaError::Transport(Box::new(e)))?;
            debug!(table = %self.qualified(), "Connected table manager session");
            *guard = Some(client);
        }
        Ok(guard)
    }

    /// Connection failures are transient and drop the session; anything else
    /// is the server refusing the statement.
    fn map_error(session: &mut Option<Client>, err: tokio_postgres::Error) -> SchemaError {
        if is_connection_error(&err) {
            warn!(error = %err, "Table manager session lost");
            *session = None;
            SchemaError::Transport(Box::new(err))
        } else {
            SchemaError::Rejected(describe(&err))
        }
    }
}

#[async_trait]
impl TableManager for PgTableManager {
    async fn create_table_if_missing(&self) -> Result<(), SchemaError> {
        let sql = CREATE_TABLE_SQL
            .replace("{schema}", &quote_ident(&self.schema))
            .replace("{table}", &self.qualified());

        let mut session = self.session().await?;
        let client = session.as_ref().ok_or_else(session_unavailable)?;
        let result = client.batch_execute(&sql).await;
        result.map_err(|e| Self::map_error(&mut session, e))?;
        info!(table = %self.qualified(), "Ensured destination table");
        Ok(())
    }

    async fn list_columns(&self) -> Result<Vec<String>, SchemaError> {
        let mut session = self.session().await?;
        let client = session.as_ref().ok_or_else(session_unavailable)?;
        let result = client
            .query(LIST_COLUMNS_SQL, &[&self.schema, &self.table])
            .await;
        let rows = result.map_err(|e| Self::map_error(&mut session, e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<_, String>(0)
                    .map_err(|e| SchemaError::Rejected(describe(&e)))
            })
            .collect()
    }

    async fn add_columns(&self, columns: &[String]) -> Result<(), SchemaError> {
        if columns.is_empty() {
            return Ok(());
        }

        let mut clauses = Vec::with_capacity(columns.len());
        for column in columns {
            let column = checked_ident(column)
                .ok_or_else(|| SchemaError::Rejected(format!("invalid column name '{column}'")))?;
            clauses.push(format!("ADD COLUMN IF NOT EXISTS {} JSONB", quote_ident(column)));
        }
        let sql = format!("ALTER TABLE {} {}", self.qualified(), clauses.join(", "));

        let mut session = self.session().await?;
        let client = session.as_ref().ok_or_else(session_unavailable)?;
        let result = client.batch_execute(&sql).await;
        result.map_err(|e| Self::map_error(&mut session, e))?;
        info!(table = %self.qualified(), columns = ?columns, "Added columns");
        Ok(())
    }
}

fn session_unavailable() -> SchemaError {
    SchemaError::Transport("table manager session unavailable".into())
}
