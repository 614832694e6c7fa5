//! Entity mapping and resilient execution on top of a Cassandra/ScyllaDB session
//!
//! The crate sits between application entities and a CQL session:
//!
//! - [`codec`] converts entity values to driver values against a declared
//!   type spec (`int`, `set<text>`, `map<text, list<int>>`, ...) and back.
//! - [`connection`] holds the current session and retries transient
//!   failures on a fresh one, up to a configured budget.
//! - [`orm::EntityManager`] queues inserts, updates and deletes and flushes
//!   them as one logged batch.
//! - [`orm::Query`] binds parameters, runs prepared statements and hydrates
//!   rows into entities or records.
//!
//! # Features
//!
//! - `metrics` - command telemetry through the `metrics` crate
//!
//! # Example
//!
//! ```ignore
//! use cassandra_orm::cassandra::ScyllaConnector;
//! use cassandra_orm::prelude::*;
//!
//! #[derive(Default)]
//! struct User {
//!     id: Option<uuid::Uuid>,
//!     name: Option<String>,
//! }
//!
//! impl Entity for User {
//!     fn metadata() -> OrmResult<EntityMetadata> {
//!         EntityMetadata::builder("User")
//!             .field("id", "uuid")
//!             .field("name", "text")
//!             .build()
//!     }
//!
//!     fn accessors() -> AccessorTable<Self> {
//!         cassandra_orm::accessors!(User { id, name })
//!     }
//! }
//!
//! let config = CassandraConfig::from_env()?;
//! let em = EntityManager::new(Connection::<ScyllaConnector>::from_config(config)?);
//!
//! em.insert(&User { id: Some(uuid::Uuid::new_v4()), name: Some("Ada".into()) })?;
//! em.flush().await?;
//!
//! let users = em.get_repository::<User>()?.find_all().await?;
//! ```

pub mod cassandra;
pub mod codec;
pub mod common;
pub mod connection;
pub mod hydration;
pub mod mapping;
pub mod orm;
pub mod session;
pub mod telemetry;

pub use common::{OrmError, OrmResult, StoreError, StoreErrorKind, TypeError};

/// Common imports for applications defining entities
pub mod prelude {
    pub use crate::cassandra::CassandraConfig;
    pub use crate::codec::{PlainValue, Record};
    pub use crate::common::{OrmError, OrmResult};
    pub use crate::connection::Connection;
    pub use crate::hydration::{Hydrated, HydrationMode};
    pub use crate::mapping::{AccessorTable, Entity, EntityMetadata, PrimaryKey};
    pub use crate::orm::{EntityManager, WriteOptions};
    pub use core_config::FromEnv;
}
