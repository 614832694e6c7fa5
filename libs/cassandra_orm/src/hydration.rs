//! Turning decoded rows into entities or associative records
//!
//! Both modes follow the same presence rule: only columns present in the row
//! are applied, anything missing stays at the entity's default. In object
//! mode a null cell counts as unset as well, so plain (non-`Option`) fields
//! keep their `Default` value.

use crate::codec::Record;
use crate::common::{OrmError, OrmResult};
use crate::mapping::{Entity, EntityMapping};

/// Result shape requested from a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum HydrationMode {
    /// Populate entity instances
    #[default]
    Object = 1,
    /// Field name → value records
    Associative = 2,
}

impl HydrationMode {
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Hydrator implementing this mode for `E`.
    pub fn hydrator<E: Entity>(self) -> Box<dyn Hydrator<E>> {
        match self {
            HydrationMode::Object => Box::new(ObjectHydrator),
            HydrationMode::Associative => Box::new(AssociativeHydrator),
        }
    }
}

impl TryFrom<u8> for HydrationMode {
    type Error = OrmError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(HydrationMode::Object),
            2 => Ok(HydrationMode::Associative),
            other => Err(OrmError::InvalidHydrationMode(other)),
        }
    }
}

/// A hydrated row.
#[derive(Debug, Clone, PartialEq)]
pub enum Hydrated<E> {
    Object(E),
    Associative(Record),
}

impl<E> Hydrated<E> {
    pub fn into_object(self) -> Option<E> {
        match self {
            Hydrated::Object(entity) => Some(entity),
            Hydrated::Associative(_) => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            Hydrated::Associative(record) => Some(record),
            Hydrated::Object(_) => None,
        }
    }
}

/// Converts one decoded row (column name → value) into an entity representation.
pub trait Hydrator<E: Entity>: Send + Sync {
    fn hydrate_row(&self, mapping: &EntityMapping<E>, row: Record) -> OrmResult<Hydrated<E>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectHydrator;

impl ObjectHydrator {
    pub fn hydrate<E: Entity>(&self, mapping: &EntityMapping<E>, mut row: Record) -> OrmResult<E> {
        let metadata = mapping.metadata();
        let mut entity = E::default();

        for field in &metadata.fields {
            let Some(value) = row.take(&field.column_name) else {
                continue;
            };
            let accessor = mapping.accessor(field)?;
            if value.is_null() {
                continue;
            }
            (accessor.set)(&mut entity, value).map_err(|e| OrmError::Hydration {
                entity: metadata.name.clone(),
                field: field.field_name.clone(),
                type_spec: field.type_spec.clone(),
                message: e.to_string(),
            })?;
        }

        Ok(entity)
    }
}

impl<E: Entity> Hydrator<E> for ObjectHydrator {
    fn hydrate_row(&self, mapping: &EntityMapping<E>, row: Record) -> OrmResult<Hydrated<E>> {
        self.hydrate(mapping, row).map(Hydrated::Object)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AssociativeHydrator;

impl AssociativeHydrator {
    pub fn hydrate<E: Entity>(&self, mapping: &EntityMapping<E>, mut row: Record) -> Record {
        let fields = &mapping.metadata().fields;
        let mut record = Record::with_capacity(fields.len());

        for field in fields {
            if let Some(value) = row.take(&field.column_name) {
                record.insert(field.field_name.clone(), value);
            }
        }

        record
    }
}

impl<E: Entity> Hydrator<E> for AssociativeHydrator {
    fn hydrate_row(&self, mapping: &EntityMapping<E>, row: Record) -> OrmResult<Hydrated<E>> {
        Ok(Hydrated::Associative(self.hydrate(mapping, row)))
    }
}
