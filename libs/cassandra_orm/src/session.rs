//! The session boundary consumed by [`Connection`](crate::connection::Connection)
//!
//! A [`SessionFactory`] opens sessions over a keyspace; a [`CqlSession`]
//! prepares and executes statements. The driver-backed implementation lives
//! in [`crate::cassandra`]; tests use a scripted in-memory one.

use async_trait::async_trait;
use scylla::value::CqlValue;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::codec::{self, Record};
use crate::common::StoreError;

/// Read/write consistency level requested for a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    Any,
    #[default]
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    Serial,
    LocalSerial,
    LocalOne,
}

impl Consistency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Consistency::Any => "any",
            Consistency::One => "one",
            Consistency::Two => "two",
            Consistency::Three => "three",
            Consistency::Quorum => "quorum",
            Consistency::All => "all",
            Consistency::LocalQuorum => "local_quorum",
            Consistency::EachQuorum => "each_quorum",
            Consistency::Serial => "serial",
            Consistency::LocalSerial => "local_serial",
            Consistency::LocalOne => "local_one",
        }
    }
}

impl FromStr for Consistency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Consistency::Any),
            "one" => Ok(Consistency::One),
            "two" => Ok(Consistency::Two),
            "three" => Ok(Consistency::Three),
            "quorum" => Ok(Consistency::Quorum),
            "all" => Ok(Consistency::All),
            "local_quorum" => Ok(Consistency::LocalQuorum),
            "each_quorum" => Ok(Consistency::EachQuorum),
            "serial" => Ok(Consistency::Serial),
            "local_serial" => Ok(Consistency::LocalSerial),
            "local_one" => Ok(Consistency::LocalOne),
            other => Err(format!("unknown consistency level '{other}'")),
        }
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call execution options. Passing `None` leaves the session defaults
/// in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOptions {
    pub consistency: Option<Consistency>,
    pub timeout: Option<Duration>,
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = Some(consistency);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A prepared statement plus its bound values.
#[derive(Debug, Clone)]
pub struct BoundStatement<P> {
    pub statement: P,
    pub values: Vec<CqlValue>,
}

/// A logged batch: applied atomically within the partitions it touches.
#[derive(Debug, Clone)]
pub struct Batch<P> {
    entries: Vec<BoundStatement<P>>,
}

impl<P> Batch<P> {
    pub fn logged() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, statement: P, values: Vec<CqlValue>) {
        self.entries.push(BoundStatement { statement, values });
    }

    pub fn entries(&self) -> &[BoundStatement<P>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What a session is asked to execute.
#[derive(Debug, Clone)]
pub enum Statement<P> {
    /// Unprepared CQL text
    Simple { cql: String, values: Vec<CqlValue> },
    Prepared(BoundStatement<P>),
    Batch(Batch<P>),
}

impl<P> Statement<P> {
    pub fn simple(cql: impl Into<String>) -> Self {
        Statement::Simple {
            cql: cql.into(),
            values: Vec::new(),
        }
    }

    pub fn prepared(statement: P, values: Vec<CqlValue>) -> Self {
        Statement::Prepared(BoundStatement { statement, values })
    }

    /// Short description for telemetry and logs
    pub fn describe(&self) -> Vec<String>
    where
        P: fmt::Display,
    {
        match self {
            Statement::Simple { cql, .. } => vec![cql.clone()],
            Statement::Prepared(bound) => vec![bound.statement.to_string()],
            Statement::Batch(batch) => batch
                .entries()
                .iter()
                .map(|entry| entry.statement.to_string())
                .collect(),
        }
    }
}

/// Rows returned by a statement. Statements that return no rows produce an
/// empty result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<CqlValue>>>,
}

impl QueryRows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<CqlValue>>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Decoded rows in result order
    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        self.rows
            .iter()
            .map(|row| codec::decode_row(&self.columns, row))
    }

    pub fn first_record(&self) -> Option<Record> {
        self.rows
            .first()
            .map(|row| codec::decode_row(&self.columns, row))
    }
}

/// Table description within a [`SchemaSnapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<String>,
    pub partition_key: Vec<String>,
    pub clustering_key: Vec<String>,
}

/// Keyspace schema as seen by the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    pub keyspace: String,
    pub tables: BTreeMap<String, TableSchema>,
}

impl SchemaSnapshot {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }
}

/// An open session over one keyspace.
#[async_trait]
pub trait CqlSession: Send + Sync + 'static {
    /// Driver handle of a prepared statement
    type Prepared: Clone + fmt::Debug + fmt::Display + Send + Sync + 'static;

    async fn prepare(&self, cql: &str) -> Result<Self::Prepared, StoreError>;

    async fn execute(
        &self,
        statement: &Statement<Self::Prepared>,
        options: Option<&ExecutionOptions>,
    ) -> Result<QueryRows, StoreError>;

    async fn close(&self, timeout: Option<Duration>) -> Result<(), StoreError>;

    async fn schema(&self) -> Result<SchemaSnapshot, StoreError>;
}

/// Opens sessions; each call yields a fresh session.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: CqlSession;

    async fn open(&self, keyspace: &str) -> Result<Self::Session, StoreError>;
}

/// Prepared handle type of the sessions a factory opens
pub type PreparedOf<F> = <<F as SessionFactory>::Session as CqlSession>::Prepared;
