use crate::codec::{ConversionError, PlainValue};

/// Reads a field; `None` means the field is unset.
pub type Getter<E> = fn(&E) -> Option<PlainValue>;

/// Writes a decoded value into a field.
pub type Setter<E> = fn(&mut E, PlainValue) -> Result<(), ConversionError>;

pub struct FieldAccessor<E> {
    pub field_name: &'static str,
    pub get: Getter<E>,
    pub set: Setter<E>,
}

impl<E> Clone for FieldAccessor<E> {
    fn clone(&self) -> Self {
        Self {
            field_name: self.field_name,
            get: self.get,
            set: self.set,
        }
    }
}

impl<E> std::fmt::Debug for FieldAccessor<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("field_name", &self.field_name)
            .finish()
    }
}

/// Per-entity table of field accessors, registered at compile time.
///
/// Usually built with the [`accessors!`](crate::accessors) macro.
pub struct AccessorTable<E> {
    entries: Vec<FieldAccessor<E>>,
}

impl<E> AccessorTable<E> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn field(mut self, field_name: &'static str, get: Getter<E>, set: Setter<E>) -> Self {
        self.entries.push(FieldAccessor {
            field_name,
            get,
            set,
        });
        self
    }

    pub fn get(&self, field_name: &str) -> Option<&FieldAccessor<E>> {
        self.entries.iter().find(|a| a.field_name == field_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E> Default for AccessorTable<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for AccessorTable<E> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<E> std::fmt::Debug for AccessorTable<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

/// Build an [`AccessorTable`] for plain struct fields whose types implement
/// [`ToPlain`](crate::codec::ToPlain) and [`FromPlain`](crate::codec::FromPlain).
///
/// ```ignore
/// fn accessors() -> AccessorTable<User> {
///     cassandra_orm::accessors!(User { id, name, tags })
/// }
/// ```
#[macro_export]
macro_rules! accessors {
    ($entity:ty { $($field:ident),* $(,)? }) => {
        $crate::mapping::AccessorTable::<$entity>::new()
            $(
                .field(
                    stringify!($field),
                    |entity: &$entity| $crate::codec::ToPlain::to_plain(&entity.$field),
                    |entity: &mut $entity, value| {
                        entity.$field = $crate::codec::FromPlain::from_plain(value)?;
                        Ok(())
                    },
                )
            )*
    };
}
