use std::sync::Arc;

use super::Query;
use crate::codec::{self, PlainValue};
use crate::common::{OrmError, OrmResult};
use crate::connection::Connection;
use crate::hydration::ObjectHydrator;
use crate::mapping::{Entity, EntityMapping, EntityMetadata};
use crate::session::{SessionFactory, Statement};

/// Read access to one entity table.
pub struct EntityRepository<E: Entity, F: SessionFactory> {
    connection: Connection<F>,
    mapping: Arc<EntityMapping<E>>,
}

impl<E: Entity, F: SessionFactory> EntityRepository<E, F> {
    pub fn new(connection: Connection<F>, mapping: Arc<EntityMapping<E>>) -> Self {
        Self {
            connection,
            mapping,
        }
    }

    pub fn metadata(&self) -> &EntityMetadata {
        self.mapping.metadata()
    }

    /// Load the entity whose `id` column equals `id`.
    pub async fn find(&self, id: impl Into<PlainValue>) -> OrmResult<Option<E>> {
        let metadata = self.mapping.metadata();
        let field = metadata.column("id").ok_or_else(|| OrmError::MissingIdentifier {
            entity: metadata.name.clone(),
        })?;
        let id = codec::encode(field.spec(), &id.into())
            .map_err(|e| OrmError::from(e.for_field(&field.field_name)))?;

        let cql = format!("{} WHERE id = ?", self.select());
        let prepared = self.connection.prepare(&cql).await?;
        let rows = self
            .connection
            .execute(Statement::prepared(prepared, vec![id]), None)
            .await?;

        rows.first_record()
            .map(|record| ObjectHydrator.hydrate(&self.mapping, record))
            .transpose()
    }

    pub async fn find_all(&self) -> OrmResult<Vec<E>> {
        let rows = self
            .connection
            .execute(Statement::simple(self.select()), None)
            .await?;

        rows.records()
            .map(|record| ObjectHydrator.hydrate(&self.mapping, record))
            .collect()
    }

    /// Query over this entity's mapping; `cql` may use any WHERE clause.
    pub fn create_query(&self, cql: impl Into<String>) -> Query<E, F> {
        Query::new(self.connection.clone(), Arc::clone(&self.mapping), cql)
    }

    fn select(&self) -> String {
        let metadata = self.mapping.metadata();
        let columns: Vec<&str> = metadata
            .fields
            .iter()
            .map(|field| field.column_name.as_str())
            .collect();
        format!(
            "SELECT {} FROM \"{}\".\"{}\"",
            columns.join(", "),
            self.connection.keyspace(),
            metadata.table_name
        )
    }
}
