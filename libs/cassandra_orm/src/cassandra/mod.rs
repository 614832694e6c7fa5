//! Cassandra/ScyllaDB driver binding
//!
//! Implements the session boundary on top of the `scylla` driver, which is
//! compatible with both Apache Cassandra and ScyllaDB.
//!
//! # Example
//!
//! ```ignore
//! use cassandra_orm::cassandra::{CassandraConfig, ScyllaConnector};
//! use cassandra_orm::connection::Connection;
//!
//! let config = CassandraConfig::new(vec!["127.0.0.1:9042"], "shop")
//!     .with_datacenter("dc1")
//!     .with_credentials("user", "password")
//!     .with_retries(2);
//! let connection = Connection::<ScyllaConnector>::from_config(config)?;
//! let status = connection.check_health().await;
//! ```

mod config;
mod connector;
mod health;

pub use config::{CassandraConfig, LoadBalancing};
pub use connector::{ScyllaConnector, ScyllaPrepared, ScyllaSession};
pub use health::HealthStatus;

pub use scylla::value::CqlValue;
