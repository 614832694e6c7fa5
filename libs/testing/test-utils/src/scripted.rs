//! Scripted in-memory session
//!
//! `ScriptedFactory` implements the session boundary without a cluster. It
//! records every call made through it and can be told to fail, so tests can
//! assert exactly what a connection or entity manager sent.

use async_trait::async_trait;
use cassandra_orm::common::StoreError;
use cassandra_orm::session::{
    CqlSession, ExecutionOptions, QueryRows, SchemaSnapshot, SessionFactory, Statement,
};
use parking_lot::Mutex;
use scylla::value::CqlValue;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

/// A statement as the session received it; prepared statements are
/// identified by their CQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutedStatement {
    Simple { cql: String, values: Vec<CqlValue> },
    Prepared { cql: String, values: Vec<CqlValue> },
    Batch(Vec<(String, Vec<CqlValue>)>),
}

impl ExecutedStatement {
    /// CQL of a single statement; `None` for batches
    pub fn cql(&self) -> Option<&str> {
        match self {
            ExecutedStatement::Simple { cql, .. } | ExecutedStatement::Prepared { cql, .. } => {
                Some(cql)
            }
            ExecutedStatement::Batch(_) => None,
        }
    }

    pub fn values(&self) -> &[CqlValue] {
        match self {
            ExecutedStatement::Simple { values, .. }
            | ExecutedStatement::Prepared { values, .. } => values,
            ExecutedStatement::Batch(_) => &[],
        }
    }
}

/// One recorded call. `session` is the 1-based number of the session the
/// call went to, in open order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    Open { session: u32, keyspace: String },
    Prepare { session: u32, cql: String },
    Execute { session: u32, statement: ExecutedStatement },
    Close { session: u32 },
}

#[derive(Default)]
struct Script {
    calls: Vec<SessionCall>,
    opened: u32,
    failing_opens: VecDeque<StoreError>,
    failures: VecDeque<StoreError>,
    responses: Vec<(String, QueryRows)>,
    schema: SchemaSnapshot,
    rendezvous: Option<Arc<Barrier>>,
}

impl Script {
    fn next_failure(&mut self) -> Option<StoreError> {
        self.failures.pop_front()
    }

    fn response_for(&self, cql: &str) -> QueryRows {
        self.responses
            .iter()
            .find(|(fragment, _)| cql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }
}

/// Session factory driven by a script shared with every session it opens.
///
/// Clones share the script, so a test can keep one handle while the
/// connection owns another.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    script: Arc<Mutex<Script>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` prepare/execute calls with a transient error.
    pub fn fail_transient(&self, count: u32) -> &Self {
        let mut script = self.script.lock();
        for n in 1..=count {
            script
                .failures
                .push_back(StoreError::transient(format!("connection reset #{n}")));
        }
        self
    }

    /// Fail the next prepare/execute call with `error`.
    pub fn fail_with(&self, error: StoreError) -> &Self {
        self.script.lock().failures.push_back(error);
        self
    }

    /// Fail the next `count` session opens with a transient error.
    pub fn fail_opens(&self, count: u32) -> &Self {
        let mut script = self.script.lock();
        for n in 1..=count {
            script
                .failing_opens
                .push_back(StoreError::transient(format!("no hosts available #{n}")));
        }
        self
    }

    /// Answer statements whose CQL contains `fragment` with `rows`. The
    /// first matching registration wins; anything else returns no rows.
    pub fn respond_to(&self, fragment: impl Into<String>, rows: QueryRows) -> &Self {
        self.script.lock().responses.push((fragment.into(), rows));
        self
    }

    /// Hold every execute until `parties` executes are in flight, so
    /// concurrent callers observe the same session and fail together.
    pub fn rendezvous(&self, parties: usize) -> &Self {
        self.script.lock().rendezvous = Some(Arc::new(Barrier::new(parties)));
        self
    }

    pub fn with_schema(&self, schema: SchemaSnapshot) -> &Self {
        self.script.lock().schema = schema;
        self
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.script.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.script.lock().calls.clear();
    }

    pub fn opens(&self) -> u32 {
        self.script.lock().opened
    }

    pub fn prepares(&self) -> Vec<String> {
        self.script
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                SessionCall::Prepare { cql, .. } => Some(cql.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn executes(&self) -> Vec<ExecutedStatement> {
        self.script
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                SessionCall::Execute { statement, .. } => Some(statement.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn batches(&self) -> Vec<Vec<(String, Vec<CqlValue>)>> {
        self.executes()
            .into_iter()
            .filter_map(|statement| match statement {
                ExecutedStatement::Batch(entries) => Some(entries),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self) -> usize {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, SessionCall::Close { .. }))
            .count()
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    type Session = ScriptedSession;

    async fn open(&self, keyspace: &str) -> Result<ScriptedSession, StoreError> {
        let mut script = self.script.lock();
        if let Some(error) = script.failing_opens.pop_front() {
            return Err(error);
        }

        script.opened += 1;
        let id = script.opened;
        script.calls.push(SessionCall::Open {
            session: id,
            keyspace: keyspace.to_string(),
        });
        tracing::debug!(session = id, keyspace, "Scripted session opened");

        Ok(ScriptedSession {
            id,
            script: Arc::clone(&self.script),
        })
    }
}

pub struct ScriptedSession {
    id: u32,
    script: Arc<Mutex<Script>>,
}

impl ScriptedSession {
    pub fn id(&self) -> u32 {
        self.id
    }
}

#[async_trait]
impl CqlSession for ScriptedSession {
    type Prepared = String;

    async fn prepare(&self, cql: &str) -> Result<String, StoreError> {
        let mut script = self.script.lock();
        script.calls.push(SessionCall::Prepare {
            session: self.id,
            cql: cql.to_string(),
        });
        match script.next_failure() {
            Some(error) => Err(error),
            None => Ok(cql.to_string()),
        }
    }

    async fn execute(
        &self,
        statement: &Statement<String>,
        _options: Option<&ExecutionOptions>,
    ) -> Result<QueryRows, StoreError> {
        let executed = match statement {
            Statement::Simple { cql, values } => ExecutedStatement::Simple {
                cql: cql.clone(),
                values: values.clone(),
            },
            Statement::Prepared(bound) => ExecutedStatement::Prepared {
                cql: bound.statement.clone(),
                values: bound.values.clone(),
            },
            Statement::Batch(batch) => ExecutedStatement::Batch(
                batch
                    .entries()
                    .iter()
                    .map(|entry| (entry.statement.clone(), entry.values.clone()))
                    .collect(),
            ),
        };

        let (result, rendezvous) = {
            let mut script = self.script.lock();
            let rows = executed
                .cql()
                .map(|cql| script.response_for(cql))
                .unwrap_or_default();
            script.calls.push(SessionCall::Execute {
                session: self.id,
                statement: executed,
            });
            let result = match script.next_failure() {
                Some(error) => Err(error),
                None => Ok(rows),
            };
            (result, script.rendezvous.clone())
        };

        if let Some(barrier) = rendezvous {
            barrier.wait().await;
        }
        result
    }

    async fn close(&self, _timeout: Option<Duration>) -> Result<(), StoreError> {
        self.script
            .lock()
            .calls
            .push(SessionCall::Close { session: self.id });
        Ok(())
    }

    async fn schema(&self) -> Result<SchemaSnapshot, StoreError> {
        let mut script = self.script.lock();
        match script.next_failure() {
            Some(error) => Err(error),
            None => Ok(script.schema.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls_in_order() {
        let factory = ScriptedFactory::new();
        let session = factory.open("shop").await.unwrap();
        let prepared = session.prepare("SELECT 1").await.unwrap();
        session
            .execute(&Statement::prepared(prepared, vec![]), None)
            .await
            .unwrap();

        assert_eq!(
            factory.calls(),
            vec![
                SessionCall::Open {
                    session: 1,
                    keyspace: "shop".to_string()
                },
                SessionCall::Prepare {
                    session: 1,
                    cql: "SELECT 1".to_string()
                },
                SessionCall::Execute {
                    session: 1,
                    statement: ExecutedStatement::Prepared {
                        cql: "SELECT 1".to_string(),
                        values: vec![]
                    }
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_failures_are_consumed() {
        let factory = ScriptedFactory::new();
        factory.fail_transient(1);
        let session = factory.open("shop").await.unwrap();

        let err = session.prepare("SELECT 1").await.unwrap_err();
        assert!(err.is_transient());
        assert!(session.prepare("SELECT 1").await.is_ok());
    }

    #[tokio::test]
    async fn test_rendezvous_releases_executes_together() {
        let factory = ScriptedFactory::new();
        factory.rendezvous(2);
        let first = Arc::new(factory.open("shop").await.unwrap());
        let second = Arc::clone(&first);

        let statement = Statement::simple("SELECT 1");
        let other = statement.clone();
        let waiting = tokio::spawn(async move { second.execute(&other, None).await });
        first.execute(&statement, None).await.unwrap();
        waiting.await.unwrap().unwrap();

        assert_eq!(factory.executes().len(), 2);
    }

    #[tokio::test]
    async fn test_canned_rows_match_by_fragment() {
        let factory = ScriptedFactory::new();
        factory.respond_to(
            "system.local",
            QueryRows::new(
                vec!["release_version".to_string()],
                vec![vec![Some(CqlValue::Text("5.0".to_string()))]],
            ),
        );
        let session = factory.open("shop").await.unwrap();

        let rows = session
            .execute(&Statement::simple("SELECT release_version FROM system.local"), None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let rows = session
            .execute(&Statement::simple("SELECT * FROM users"), None)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
