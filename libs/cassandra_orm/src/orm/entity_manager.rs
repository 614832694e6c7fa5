use parking_lot::Mutex;
use scylla::value::CqlValue;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{EntityRepository, Query, SchemaManager, WriteOptions};
use crate::codec;
use crate::common::{OrmError, OrmResult};
use crate::connection::{Connection, PendingResult};
use crate::mapping::{Entity, EntityMapping, EntityMetadata, MetadataFactory};
use crate::session::{Batch, QueryRows, SessionFactory, Statement};

/// A mutation waiting for the next flush.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingStatement {
    pub cql: String,
    /// Bound values keyed by column name, in placeholder order
    pub arguments: Vec<(String, CqlValue)>,
}

impl PendingStatement {
    pub fn argument_names(&self) -> Vec<&str> {
        self.arguments.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn into_values(self) -> Vec<CqlValue> {
        self.arguments.into_iter().map(|(_, value)| value).collect()
    }
}

/// Unit of work over one connection.
///
/// `insert`, `update` and `delete` only queue statements; `flush` sends
/// everything queued so far as a single logged batch.
pub struct EntityManager<F: SessionFactory> {
    connection: Connection<F>,
    metadata: Arc<MetadataFactory>,
    pending: Mutex<Vec<PendingStatement>>,
}

impl<F: SessionFactory> EntityManager<F> {
    pub fn new(connection: Connection<F>) -> Self {
        Self::with_metadata_factory(connection, Arc::new(MetadataFactory::new()))
    }

    pub fn with_metadata_factory(connection: Connection<F>, metadata: Arc<MetadataFactory>) -> Self {
        Self {
            connection,
            metadata,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn connection(&self) -> &Connection<F> {
        &self.connection
    }

    pub fn keyspace(&self) -> &str {
        self.connection.keyspace()
    }

    pub fn metadata_factory(&self) -> &Arc<MetadataFactory> {
        &self.metadata
    }

    pub fn class_metadata<E: Entity>(&self) -> OrmResult<Arc<EntityMetadata>> {
        Ok(Arc::clone(self.metadata.metadata_for::<E>()?.metadata()))
    }

    pub fn insert<E: Entity>(&self, entity: &E) -> OrmResult<()> {
        self.insert_with(entity, WriteOptions::default())
    }

    /// Queue an `INSERT` of every present field; unset fields are left out
    /// of the column list rather than written as null.
    pub fn insert_with<E: Entity>(&self, entity: &E, options: WriteOptions) -> OrmResult<()> {
        let mapping = self.metadata.metadata_for::<E>()?;
        let metadata = mapping.metadata();

        let arguments = mapping
            .present_values(entity)
            .map(|(field, value)| {
                codec::encode(field.spec(), &value)
                    .map(|encoded| (field.column_name.clone(), encoded))
                    .map_err(|e| OrmError::from(e.for_field(&field.field_name)))
            })
            .collect::<OrmResult<Vec<_>>>()?;

        if arguments.is_empty() {
            return Err(OrmError::Mapping(format!(
                "'{}' has no field values to write",
                metadata.name
            )));
        }

        let columns: Vec<&str> = arguments.iter().map(|(column, _)| column.as_str()).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let mut cql = format!(
            "INSERT INTO \"{}\".\"{}\" ({}) VALUES ({})",
            self.keyspace(),
            metadata.table_name,
            columns.join(", "),
            placeholders
        );

        let (ttl, if_not_exists) = options.resolve(metadata);
        if if_not_exists {
            cql.push_str(" IF NOT EXISTS");
        }
        if let Some(ttl) = ttl {
            let _ = write!(cql, " USING TTL {ttl}");
        }

        self.pending.lock().push(PendingStatement { cql, arguments });
        Ok(())
    }

    /// Same as [`insert`](Self::insert): writes are upserts, so updating an
    /// entity re-inserts its present fields.
    pub fn update<E: Entity>(&self, entity: &E) -> OrmResult<()> {
        self.insert(entity)
    }

    pub fn update_with<E: Entity>(&self, entity: &E, options: WriteOptions) -> OrmResult<()> {
        self.insert_with(entity, options)
    }

    /// Queue a `DELETE` by the entity's `id` column.
    pub fn delete<E: Entity>(&self, entity: &E) -> OrmResult<()> {
        let mapping = self.metadata.metadata_for::<E>()?;
        let metadata = mapping.metadata();
        let id = identifier(&mapping, entity)?;

        let cql = format!(
            "DELETE FROM \"{}\".\"{}\" WHERE id = ?",
            self.keyspace(),
            metadata.table_name
        );
        self.pending.lock().push(PendingStatement {
            cql,
            arguments: vec![("id".to_string(), id)],
        });
        Ok(())
    }

    /// Snapshot of the queued statements
    pub fn pending(&self) -> Vec<PendingStatement> {
        self.pending.lock().clone()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drop every queued statement without sending it.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    /// Send the queued statements as one logged batch and wait for it.
    ///
    /// The queue is emptied before any I/O starts; statements of a failed
    /// flush are discarded, not re-queued.
    pub async fn flush(&self) -> OrmResult<()> {
        let statements = self.take_pending();
        if statements.is_empty() {
            return Ok(());
        }

        let count = statements.len();
        debug!("CASSANDRA: BEGIN");
        let result = flush_batch(&self.connection, statements).await;
        debug!("CASSANDRA: END");

        if let Err(e) = &result {
            warn!(dropped = count, error = %e, "Flush failed; queued statements were discarded");
        }
        result.map(|_| ())
    }

    /// Like [`flush`](Self::flush), but prepares through `prepare_async`,
    /// sends the batch through `execute_async` and returns immediately.
    ///
    /// The queue is already empty when this returns.
    pub fn flush_async(&self) -> PendingResult<()> {
        let statements = self.take_pending();
        if statements.is_empty() {
            return PendingResult::ready(Ok(()));
        }

        let connection = self.connection.clone();
        PendingResult::spawn(async move {
            let count = statements.len();
            debug!("CASSANDRA: BEGIN");
            let result = flush_batch_async(&connection, statements).await;
            debug!("CASSANDRA: END");

            if let Err(e) = &result {
                warn!(dropped = count, error = %e, "Flush failed; queued statements were discarded");
            }
            result.map(|_| ())
        })
    }

    pub fn create_query<E: Entity>(&self, cql: impl Into<String>) -> OrmResult<Query<E, F>> {
        Ok(Query::new(
            self.connection.clone(),
            self.metadata.metadata_for::<E>()?,
            cql,
        ))
    }

    pub fn get_repository<E: Entity>(&self) -> OrmResult<EntityRepository<E, F>> {
        Ok(EntityRepository::new(
            self.connection.clone(),
            self.metadata.metadata_for::<E>()?,
        ))
    }

    pub fn schema_manager(&self) -> SchemaManager<F> {
        SchemaManager::new(self.connection.clone(), Arc::clone(&self.metadata))
    }

    fn take_pending(&self) -> Vec<PendingStatement> {
        std::mem::take(&mut *self.pending.lock())
    }
}

impl<F: SessionFactory> std::fmt::Debug for EntityManager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityManager")
            .field("connection", &self.connection)
            .field("pending", &self.pending_len())
            .finish()
    }
}

/// The entity's `id` value, encoded against the id column's declared type.
pub(crate) fn identifier<E: Entity>(mapping: &EntityMapping<E>, entity: &E) -> OrmResult<CqlValue> {
    let metadata = mapping.metadata();
    let missing = || OrmError::MissingIdentifier {
        entity: metadata.name.clone(),
    };

    let field = metadata.column("id").ok_or_else(missing)?;
    let value = (mapping.accessor(field)?.get)(entity).ok_or_else(missing)?;
    codec::encode(field.spec(), &value).map_err(|e| OrmError::from(e.for_field(&field.field_name)))
}

fn log_statement(statement: &PendingStatement) {
    debug!(
        cql = %statement.cql,
        arguments = ?statement.argument_names(),
        "CASSANDRA: statement"
    );
}

async fn flush_batch<F: SessionFactory>(
    connection: &Connection<F>,
    statements: Vec<PendingStatement>,
) -> OrmResult<QueryRows> {
    let mut batch = Batch::logged();
    for statement in statements {
        log_statement(&statement);
        let prepared = connection.prepare(&statement.cql).await?;
        batch.add(prepared, statement.into_values());
    }

    connection.execute(Statement::Batch(batch), None).await
}

async fn flush_batch_async<F: SessionFactory>(
    connection: &Connection<F>,
    statements: Vec<PendingStatement>,
) -> OrmResult<QueryRows> {
    let pending: Vec<_> = statements
        .iter()
        .map(|statement| {
            log_statement(statement);
            connection.prepare_async(statement.cql.clone())
        })
        .collect();
    let prepared = futures::future::try_join_all(pending).await?;

    let mut batch = Batch::logged();
    for (statement, prepared) in statements.into_iter().zip(prepared) {
        batch.add(prepared, statement.into_values());
    }

    connection
        .execute_async(Statement::Batch(batch), None)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::StoreError;
    use crate::mapping::AccessorTable;
    use crate::session::{CqlSession, ExecutionOptions, SchemaSnapshot};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    /// Counts opens; every command is refused.
    #[derive(Default)]
    struct OfflineFactory {
        opens: AtomicU32,
    }

    struct OfflineSession;

    #[async_trait]
    impl CqlSession for OfflineSession {
        type Prepared = String;

        async fn prepare(&self, _cql: &str) -> Result<String, StoreError> {
            Err(StoreError::fatal("offline"))
        }

        async fn execute(
            &self,
            _statement: &Statement<String>,
            _options: Option<&ExecutionOptions>,
        ) -> Result<QueryRows, StoreError> {
            Err(StoreError::fatal("offline"))
        }

        async fn close(&self, _timeout: Option<Duration>) -> Result<(), StoreError> {
            Ok(())
        }

        async fn schema(&self) -> Result<SchemaSnapshot, StoreError> {
            Ok(SchemaSnapshot::default())
        }
    }

    #[async_trait]
    impl SessionFactory for OfflineFactory {
        type Session = OfflineSession;

        async fn open(&self, _keyspace: &str) -> Result<OfflineSession, StoreError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(OfflineSession)
        }
    }

    #[derive(Debug, Default)]
    struct Price {
        id: Option<Uuid>,
        symbol: Option<String>,
        amount: Option<f64>,
    }

    impl Entity for Price {
        fn metadata() -> OrmResult<EntityMetadata> {
            EntityMetadata::builder("Price")
                .field("id", "uuid")
                .field("symbol", "text")
                .field("amount", "double")
                .build()
        }

        fn accessors() -> AccessorTable<Self> {
            crate::accessors!(Price { id, symbol, amount })
        }
    }

    fn manager() -> EntityManager<OfflineFactory> {
        EntityManager::new(Connection::new(OfflineFactory::default(), "market"))
    }

    #[test]
    fn test_insert_writes_only_present_fields() {
        let em = manager();
        let id = Uuid::new_v4();
        em.insert(&Price {
            id: Some(id),
            symbol: None,
            amount: Some(1.5),
        })
        .unwrap();

        let pending = em.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0].cql,
            "INSERT INTO \"market\".\"price\" (id, amount) VALUES (?, ?)"
        );
        assert_eq!(pending[0].argument_names(), vec!["id", "amount"]);
        assert_eq!(pending[0].arguments[0].1, CqlValue::Uuid(id));
        assert_eq!(pending[0].arguments[1].1, CqlValue::Double(1.5));
    }

    #[test]
    fn test_insert_with_options() {
        let em = manager();
        let price = Price {
            id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        em.insert_with(&price, WriteOptions::new().with_ttl(30).if_not_exists(true))
            .unwrap();

        assert_eq!(
            em.pending()[0].cql,
            "INSERT INTO \"market\".\"price\" (id) VALUES (?) IF NOT EXISTS USING TTL 30"
        );
    }

    #[test]
    fn test_insert_without_values_is_rejected() {
        let em = manager();
        let err = em.insert(&Price::default()).unwrap_err();
        assert!(matches!(err, OrmError::Mapping(_)));
        assert_eq!(em.pending_len(), 0);
    }

    #[test]
    fn test_insert_reports_the_offending_field() {
        #[derive(Debug, Default)]
        struct Broken {
            id: Option<String>,
        }

        impl Entity for Broken {
            fn metadata() -> OrmResult<EntityMetadata> {
                EntityMetadata::builder("Broken").field("id", "uuid").build()
            }

            fn accessors() -> AccessorTable<Self> {
                crate::accessors!(Broken { id })
            }
        }

        let em = manager();
        let err = em
            .insert(&Broken {
                id: Some("not-a-uuid".to_string()),
            })
            .unwrap_err();
        match err {
            OrmError::Type(e) => assert_eq!(e.field.as_deref(), Some("id")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_delete_by_identifier() {
        let em = manager();
        let id = Uuid::new_v4();
        em.delete(&Price {
            id: Some(id),
            ..Default::default()
        })
        .unwrap();

        let pending = em.pending();
        assert_eq!(pending[0].cql, "DELETE FROM \"market\".\"price\" WHERE id = ?");
        assert_eq!(pending[0].arguments, vec![("id".to_string(), CqlValue::Uuid(id))]);

        let err = em.delete(&Price::default()).unwrap_err();
        assert!(matches!(err, OrmError::MissingIdentifier { .. }));
    }

    #[tokio::test]
    async fn test_empty_flush_touches_nothing() {
        let em = manager();
        em.flush().await.unwrap();
        em.flush_async().await.unwrap();
        assert_eq!(em.connection().factory().opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_flush_discards_statements() {
        let em = manager();
        em.update(&Price {
            id: Some(Uuid::new_v4()),
            ..Default::default()
        })
        .unwrap();
        em.clear();
        assert_eq!(em.pending_len(), 0);

        em.insert(&Price {
            id: Some(Uuid::new_v4()),
            ..Default::default()
        })
        .unwrap();
        assert!(em.flush().await.is_err());
        assert_eq!(em.pending_len(), 0);
    }
}
