use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{AccessorTable, Entity, EntityMetadata, FieldAccessor, FieldMapping};
use crate::codec::PlainValue;
use crate::common::{OrmError, OrmResult};

/// Metadata and accessors of one entity type, checked against each other.
#[derive(Debug)]
pub struct EntityMapping<E> {
    metadata: Arc<EntityMetadata>,
    accessors: AccessorTable<E>,
}

impl<E: Entity> EntityMapping<E> {
    pub fn new(metadata: EntityMetadata, accessors: AccessorTable<E>) -> OrmResult<Self> {
        if let Some(missing) = metadata
            .fields
            .iter()
            .find(|f| accessors.get(&f.field_name).is_none())
        {
            return Err(OrmError::Mapping(format!(
                "no accessor for field '{}' of '{}'",
                missing.field_name, metadata.name
            )));
        }

        Ok(Self {
            metadata: Arc::new(metadata),
            accessors,
        })
    }

    pub fn metadata(&self) -> &Arc<EntityMetadata> {
        &self.metadata
    }

    pub fn accessor(&self, field: &FieldMapping) -> OrmResult<&FieldAccessor<E>> {
        self.accessors.get(&field.field_name).ok_or_else(|| {
            OrmError::Mapping(format!(
                "no accessor for field '{}' of '{}'",
                field.field_name, self.metadata.name
            ))
        })
    }

    /// Present field values in mapping order; unset fields are skipped.
    pub fn present_values<'a>(
        &'a self,
        entity: &'a E,
    ) -> impl Iterator<Item = (&'a FieldMapping, PlainValue)> + 'a {
        self.metadata.fields.iter().filter_map(move |field| {
            let accessor = self.accessors.get(&field.field_name)?;
            (accessor.get)(entity).map(|value| (field, value))
        })
    }
}

/// Cache of entity mappings keyed by type, with a by-name view.
///
/// Loaded once per type and shared read-only afterwards.
#[derive(Default)]
pub struct MetadataFactory {
    by_type: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    by_name: RwLock<HashMap<String, Arc<EntityMetadata>>>,
}

impl MetadataFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata_for<E: Entity>(&self) -> OrmResult<Arc<EntityMapping<E>>> {
        if let Some(mapping) = self.cached::<E>() {
            return Ok(mapping);
        }

        let mapping = EntityMapping::new(E::metadata()?, E::accessors())?;
        debug!(
            entity = %mapping.metadata.name,
            table = %mapping.metadata.table_name,
            "Loaded entity metadata"
        );
        Ok(self.store(mapping))
    }

    /// Replace the cached mapping for `E`.
    pub fn set_metadata_for<E: Entity>(&self, metadata: EntityMetadata) -> OrmResult<()> {
        let mapping = EntityMapping::new(metadata, E::accessors())?;
        self.store(mapping);
        Ok(())
    }

    pub fn get_metadata_for(&self, entity_name: &str) -> OrmResult<Arc<EntityMetadata>> {
        self.by_name
            .read()
            .get(entity_name)
            .cloned()
            .ok_or_else(|| OrmError::UnknownEntity(entity_name.to_string()))
    }

    pub fn has_metadata_for(&self, entity_name: &str) -> bool {
        self.by_name.read().contains_key(entity_name)
    }

    pub fn loaded_metadata(&self) -> Vec<Arc<EntityMetadata>> {
        let mut loaded: Vec<_> = self.by_name.read().values().cloned().collect();
        loaded.sort_by(|a, b| a.name.cmp(&b.name));
        loaded
    }

    fn cached<E: Entity>(&self) -> Option<Arc<EntityMapping<E>>> {
        let erased = self.by_type.read().get(&TypeId::of::<E>()).cloned()?;
        erased.downcast::<EntityMapping<E>>().ok()
    }

    fn store<E: Entity>(&self, mapping: EntityMapping<E>) -> Arc<EntityMapping<E>> {
        let mapping = Arc::new(mapping);
        self.by_name
            .write()
            .insert(mapping.metadata.name.clone(), Arc::clone(&mapping.metadata));
        self.by_type
            .write()
            .insert(TypeId::of::<E>(), Arc::clone(&mapping) as Arc<dyn Any + Send + Sync>);
        mapping
    }
}

impl std::fmt::Debug for MetadataFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataFactory")
            .field("loaded", &self.by_name.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::PrimaryKey;

    #[derive(Debug, Default)]
    struct PriceRequest {
        id: Option<String>,
        amount: Option<i64>,
    }

    impl Entity for PriceRequest {
        fn metadata() -> OrmResult<EntityMetadata> {
            EntityMetadata::builder("PriceRequest")
                .field("id", "uuid")
                .field("amount", "bigint")
                .primary_key(PrimaryKey::new(["id"]))
                .build()
        }

        fn accessors() -> AccessorTable<Self> {
            crate::accessors!(PriceRequest { id, amount })
        }
    }

    #[derive(Debug, Default)]
    struct Incomplete;

    impl Entity for Incomplete {
        fn metadata() -> OrmResult<EntityMetadata> {
            EntityMetadata::builder("Incomplete").field("id", "uuid").build()
        }

        fn accessors() -> AccessorTable<Self> {
            AccessorTable::new()
        }
    }

    #[test]
    fn test_metadata_is_loaded_once() {
        let factory = MetadataFactory::new();
        assert!(!factory.has_metadata_for("PriceRequest"));

        let first = factory.metadata_for::<PriceRequest>().unwrap();
        let second = factory.metadata_for::<PriceRequest>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert!(factory.has_metadata_for("PriceRequest"));
        let by_name = factory.get_metadata_for("PriceRequest").unwrap();
        assert_eq!(by_name.table_name, "price_request");
        assert_eq!(factory.loaded_metadata().len(), 1);
    }

    #[test]
    fn test_unknown_entity() {
        let err = MetadataFactory::new().get_metadata_for("Nope").unwrap_err();
        assert!(matches!(err, OrmError::UnknownEntity(name) if name == "Nope"));
    }

    #[test]
    fn test_missing_accessor_is_a_mapping_error() {
        let err = MetadataFactory::new().metadata_for::<Incomplete>().unwrap_err();
        assert!(matches!(err, OrmError::Mapping(_)));
    }

    #[test]
    fn test_set_metadata_overrides_table() {
        let factory = MetadataFactory::new();
        let metadata = EntityMetadata::builder("PriceRequest")
            .table("requests_v2")
            .field("id", "uuid")
            .field("amount", "bigint")
            .build()
            .unwrap();
        factory.set_metadata_for::<PriceRequest>(metadata).unwrap();

        let mapping = factory.metadata_for::<PriceRequest>().unwrap();
        assert_eq!(mapping.metadata().table_name, "requests_v2");
    }

    #[test]
    fn test_present_values_skip_unset_fields() {
        let factory = MetadataFactory::new();
        let mapping = factory.metadata_for::<PriceRequest>().unwrap();
        let entity = PriceRequest {
            id: None,
            amount: Some(10),
        };

        let present: Vec<_> = mapping
            .present_values(&entity)
            .map(|(field, value)| (field.column_name.as_str(), value))
            .collect();
        assert_eq!(present, vec![("amount", PlainValue::Int(10))]);
    }
}
