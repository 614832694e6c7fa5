use std::sync::Arc;
use tracing::info;

use crate::common::OrmResult;
use crate::connection::Connection;
use crate::mapping::{Entity, FieldMapping, MetadataFactory, PrimaryKey};
use crate::session::{SessionFactory, Statement};

/// DDL helpers. Every statement is prepared, then executed, through the
/// connection's retry path.
pub struct SchemaManager<F: SessionFactory> {
    connection: Connection<F>,
    metadata: Arc<MetadataFactory>,
}

impl<F: SessionFactory> SchemaManager<F> {
    pub fn new(connection: Connection<F>, metadata: Arc<MetadataFactory>) -> Self {
        Self {
            connection,
            metadata,
        }
    }

    /// Create a `SimpleStrategy` keyspace.
    ///
    /// The statement runs on this manager's connection, so that connection
    /// must be bound to a keyspace that already exists (`system` works).
    pub async fn create_keyspace_if_not_exists(
        &self,
        keyspace: &str,
        replication_factor: u32,
    ) -> OrmResult<()> {
        self.exec(format!(
            "CREATE KEYSPACE IF NOT EXISTS \"{keyspace}\" WITH replication = \
             {{'class': 'SimpleStrategy', 'replication_factor': {replication_factor}}}"
        ))
        .await
    }

    pub async fn create_table(
        &self,
        table: &str,
        fields: &[FieldMapping],
        primary_key: &PrimaryKey,
    ) -> OrmResult<()> {
        let columns: Vec<String> = fields
            .iter()
            .map(|field| format!("{} {}", field.column_name, field.type_spec))
            .collect();
        let key = if primary_key.is_empty() {
            String::new()
        } else {
            format!(",PRIMARY KEY ({primary_key})")
        };

        self.exec(format!(
            "CREATE TABLE {} ({}{})",
            self.qualified(table),
            columns.join(","),
            key
        ))
        .await
    }

    pub async fn drop_table(&self, table: &str) -> OrmResult<()> {
        self.exec(format!("DROP TABLE IF EXISTS {}", self.qualified(table)))
            .await
    }

    pub async fn create_index(&self, table: &str, column: &str) -> OrmResult<()> {
        self.exec(format!("CREATE INDEX ON {} ({column})", self.qualified(table)))
            .await
    }

    pub async fn create_indexes<S: AsRef<str>>(&self, table: &str, columns: &[S]) -> OrmResult<()> {
        for column in columns {
            self.create_index(table, column.as_ref()).await?;
        }
        Ok(())
    }

    /// Recreate the table of `E` from its metadata: drop, create, then
    /// index. Existing data is lost.
    pub async fn create_schema_for<E: Entity>(&self) -> OrmResult<()> {
        let mapping = self.metadata.metadata_for::<E>()?;
        let metadata = mapping.metadata();

        self.drop_table(&metadata.table_name).await?;
        self.create_table(&metadata.table_name, &metadata.fields, &metadata.primary_key)
            .await?;
        self.create_indexes(&metadata.table_name, &metadata.indexes)
            .await?;

        info!(entity = %metadata.name, table = %metadata.table_name, "Created schema");
        Ok(())
    }

    fn qualified(&self, table: &str) -> String {
        format!("\"{}\".\"{}\"", self.connection.keyspace(), table)
    }

    async fn exec(&self, cql: String) -> OrmResult<()> {
        let prepared = self.connection.prepare(&cql).await?;
        self.connection
            .execute(Statement::prepared(prepared, Vec::new()), None)
            .await?;
        Ok(())
    }
}
