//! Entity manager (unit of work), queries, repositories and DDL helpers

mod entity_manager;
mod options;
mod query;
mod repository;
mod schema;

pub use entity_manager::{EntityManager, PendingStatement};
pub use options::WriteOptions;
pub use query::Query;
pub use repository::EntityRepository;
pub use schema::SchemaManager;
