//! Entity mapping: metadata descriptors, accessor tables and the metadata cache

mod accessor;
mod factory;
mod metadata;

pub use accessor::{AccessorTable, FieldAccessor, Getter, Setter};
pub use factory::{EntityMapping, MetadataFactory};
pub use metadata::{EntityMetadata, EntityMetadataBuilder, FieldMapping, PrimaryKey, to_snake_case};

use crate::common::OrmResult;

/// A type persisted through the entity manager.
///
/// `Default` provides the unset state that hydration starts from; columns
/// missing from a row, and null cells, leave the corresponding field untouched.
pub trait Entity: Default + Send + Sync + 'static {
    /// Mapping descriptor; called once per type and cached by [`MetadataFactory`].
    fn metadata() -> OrmResult<EntityMetadata>;

    fn accessors() -> AccessorTable<Self>;
}
