use crate::error::SchemaError;
use async_trait::async_trait;

/// DDL transport for the destination table.
#[async_trait]
pub trait TableManager: Send + Sync {
    /// Creates the table with its base columns unless it already exists.
    async fn create_table_if_missing(&self) -> Result<(), SchemaError>;

    /// Names of the columns the table currently has.
    async fn list_columns(&self) -> Result<Vec<String>, SchemaError>;

    /// Adds the given columns. Must tolerate columns that already exist.
    async fn add_columns(&self, columns: &[String]) -> Result<(), SchemaError>;
}
