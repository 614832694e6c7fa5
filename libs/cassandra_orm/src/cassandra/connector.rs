use async_trait::async_trait;
use scylla::client::execution_profile::ExecutionProfile;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::errors::{DbError, ExecutionError, NewSessionError, PrepareError, RequestAttemptError};
use scylla::policies::load_balancing::DefaultPolicy;
use scylla::response::query_result::QueryResult;
use scylla::statement::batch::{Batch as DriverBatch, BatchType};
use scylla::statement::prepared::PreparedStatement;
use scylla::statement::unprepared::Statement as UnpreparedStatement;
use scylla::value::Row;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{CassandraConfig, LoadBalancing};
use crate::common::{OrmResult, StoreError};
use crate::connection::Connection;
use crate::session::{
    Consistency, CqlSession, ExecutionOptions, QueryRows, SchemaSnapshot, SessionFactory,
    Statement, TableSchema,
};
use crate::telemetry::TracingTelemetry;

/// Opens driver sessions from a [`CassandraConfig`].
#[derive(Debug, Clone)]
pub struct ScyllaConnector {
    config: CassandraConfig,
}

impl ScyllaConnector {
    pub fn new(config: CassandraConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CassandraConfig {
        &self.config
    }

    fn execution_profile(&self) -> ExecutionProfile {
        let mut policy = DefaultPolicy::builder().token_aware(self.config.token_aware_routing);
        if self.config.load_balancing == LoadBalancing::DcAwareRoundRobin
            && let Some(datacenter) = &self.config.local_datacenter
        {
            policy = policy.prefer_datacenter(datacenter.clone());
        }

        ExecutionProfile::builder()
            .consistency(driver_consistency(self.config.default_consistency))
            .request_timeout(Some(self.config.request_timeout()))
            .load_balancing_policy(policy.build())
            .build()
    }
}

#[async_trait]
impl SessionFactory for ScyllaConnector {
    type Session = ScyllaSession;

    async fn open(&self, keyspace: &str) -> Result<ScyllaSession, StoreError> {
        info!(
            "Attempting to connect to Cassandra at {:?}",
            self.config.contact_points
        );

        if self.config.ssl_enabled {
            return Err(StoreError::fatal(
                "TLS connections are not supported; refusing to connect in plaintext",
            ));
        }

        let mut builder = SessionBuilder::new()
            .known_nodes(&self.config.contact_points)
            .connection_timeout(self.config.connect_timeout())
            .default_execution_profile_handle(self.execution_profile().into_handle());

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            builder = builder.user(username, password);
        }

        let session = builder
            .use_keyspace(keyspace, true)
            .build()
            .await
            .map_err(classify_new_session)?;

        info!(keyspace, "Successfully connected to Cassandra");
        Ok(ScyllaSession {
            session,
            keyspace: keyspace.to_string(),
        })
    }
}

impl Connection<ScyllaConnector> {
    /// Driver-backed connection configured from `config`.
    ///
    /// The retry budget comes from `config.retries`; command events are logged
    /// through `tracing` when `config.dispatch_events` is set.
    pub fn from_config(config: CassandraConfig) -> OrmResult<Self> {
        config.validate()?;

        let keyspace = config.keyspace.clone();
        let retry = config.retry_config();
        let dispatch_events = config.dispatch_events;

        let mut builder =
            Connection::builder(ScyllaConnector::new(config), keyspace).with_retry(retry);
        if dispatch_events {
            builder = builder.with_telemetry(Arc::new(TracingTelemetry));
        }
        Ok(builder.build())
    }
}

/// Prepared statement together with the CQL it was prepared from.
#[derive(Debug, Clone)]
pub struct ScyllaPrepared {
    cql: Arc<str>,
    statement: PreparedStatement,
}

impl ScyllaPrepared {
    pub fn cql(&self) -> &str {
        &self.cql
    }
}

impl fmt::Display for ScyllaPrepared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cql)
    }
}

/// One driver session over a keyspace.
pub struct ScyllaSession {
    session: Session,
    keyspace: String,
}

impl ScyllaSession {
    pub fn inner(&self) -> &Session {
        &self.session
    }
}

impl fmt::Debug for ScyllaSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScyllaSession")
            .field("keyspace", &self.keyspace)
            .finish()
    }
}

#[async_trait]
impl CqlSession for ScyllaSession {
    type Prepared = ScyllaPrepared;

    async fn prepare(&self, cql: &str) -> Result<ScyllaPrepared, StoreError> {
        let statement = self.session.prepare(cql).await.map_err(classify_prepare)?;
        Ok(ScyllaPrepared {
            cql: Arc::from(cql),
            statement,
        })
    }

    async fn execute(
        &self,
        statement: &Statement<ScyllaPrepared>,
        options: Option<&ExecutionOptions>,
    ) -> Result<QueryRows, StoreError> {
        let consistency = options
            .and_then(|o| o.consistency)
            .map(driver_consistency);

        let request = async {
            match statement {
                Statement::Simple { cql, values } => {
                    let mut driver = UnpreparedStatement::new(cql.as_str());
                    if let Some(consistency) = consistency {
                        driver.set_consistency(consistency);
                    }
                    self.session.query_unpaged(driver, values).await
                }
                Statement::Prepared(bound) => {
                    let mut driver = bound.statement.statement.clone();
                    if let Some(consistency) = consistency {
                        driver.set_consistency(consistency);
                    }
                    self.session.execute_unpaged(&driver, &bound.values).await
                }
                Statement::Batch(batch) => {
                    let mut driver = DriverBatch::new(BatchType::Logged);
                    let mut values = Vec::with_capacity(batch.len());
                    for entry in batch.entries() {
                        driver.append_statement(entry.statement.statement.clone());
                        values.push(entry.values.clone());
                    }
                    if let Some(consistency) = consistency {
                        driver.set_consistency(consistency);
                    }
                    self.session.batch(&driver, values).await
                }
            }
        };

        let result = match options.and_then(|o| o.timeout) {
            Some(timeout) => tokio::time::timeout(timeout, request).await.map_err(|_| {
                StoreError::transient(format!("request timed out after {timeout:?}"))
            })?,
            None => request.await,
        };

        into_rows(result.map_err(classify_execution)?)
    }

    async fn close(&self, timeout: Option<Duration>) -> Result<(), StoreError> {
        // The driver closes its connection pools when the session is dropped.
        info!(keyspace = %self.keyspace, ?timeout, "Closing Cassandra session");
        Ok(())
    }

    async fn schema(&self) -> Result<SchemaSnapshot, StoreError> {
        let cluster = self.session.get_cluster_state();
        let keyspace = cluster.get_keyspace(&self.keyspace).ok_or_else(|| {
            StoreError::fatal(format!("keyspace '{}' not found in cluster metadata", self.keyspace))
        })?;

        let tables = keyspace
            .tables
            .iter()
            .map(|(name, table)| {
                let mut columns: Vec<String> = table.columns.keys().cloned().collect();
                columns.sort();
                (
                    name.clone(),
                    TableSchema {
                        columns,
                        partition_key: table.partition_key.clone(),
                        clustering_key: table.clustering_key.clone(),
                    },
                )
            })
            .collect();

        Ok(SchemaSnapshot {
            keyspace: self.keyspace.clone(),
            tables,
        })
    }
}

fn into_rows(result: QueryResult) -> Result<QueryRows, StoreError> {
    if !result.is_rows() {
        return Ok(QueryRows::default());
    }

    let rows_result = result
        .into_rows_result()
        .map_err(|e| StoreError::fatal(e.to_string()))?;
    let columns = rows_result
        .column_specs()
        .iter()
        .map(|spec| spec.name().to_string())
        .collect();
    let rows = rows_result
        .rows::<Row>()
        .map_err(|e| StoreError::fatal(e.to_string()))?
        .map(|row| row.map(|row| row.columns))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::fatal(e.to_string()))?;

    Ok(QueryRows::new(columns, rows))
}

fn driver_consistency(consistency: Consistency) -> scylla::statement::Consistency {
    use scylla::statement::Consistency as Driver;

    match consistency {
        Consistency::Any => Driver::Any,
        Consistency::One => Driver::One,
        Consistency::Two => Driver::Two,
        Consistency::Three => Driver::Three,
        Consistency::Quorum => Driver::Quorum,
        Consistency::All => Driver::All,
        Consistency::LocalQuorum => Driver::LocalQuorum,
        Consistency::EachQuorum => Driver::EachQuorum,
        Consistency::Serial => Driver::Serial,
        Consistency::LocalSerial => Driver::LocalSerial,
        Consistency::LocalOne => Driver::LocalOne,
    }
}

/// Server errors caused by the statement itself; retrying on a new session
/// cannot help.
fn is_fatal_db_error(error: &DbError) -> bool {
    matches!(
        error,
        DbError::SyntaxError
            | DbError::Invalid
            | DbError::Unauthorized
            | DbError::AlreadyExists { .. }
            | DbError::ConfigError
    )
}

fn classify_attempt(error: &RequestAttemptError) -> bool {
    matches!(error, RequestAttemptError::DbError(db, _) if is_fatal_db_error(db))
}

fn classify_execution(error: ExecutionError) -> StoreError {
    let fatal = match &error {
        ExecutionError::BadQuery(_) => true,
        ExecutionError::LastAttemptError(attempt) => classify_attempt(attempt),
        _ => false,
    };

    if fatal {
        StoreError::fatal(error.to_string())
    } else {
        StoreError::transient(error.to_string())
    }
}

fn classify_prepare(error: PrepareError) -> StoreError {
    let fatal = match &error {
        PrepareError::AllAttemptsFailed { first_attempt } => classify_attempt(first_attempt),
        _ => false,
    };

    if fatal {
        StoreError::fatal(error.to_string())
    } else {
        StoreError::transient(error.to_string())
    }
}

fn classify_new_session(error: NewSessionError) -> StoreError {
    StoreError::transient(format!("Cassandra connection failed: {error}"))
}
