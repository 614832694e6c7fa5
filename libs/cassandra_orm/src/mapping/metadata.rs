use std::fmt;
use std::sync::Arc;

use crate::codec::{TypeCodec, TypeSpec};
use crate::common::{OrmError, OrmResult};

/// One mapped field: entity field name, column name and declared column type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    pub field_name: String,
    pub column_name: String,
    pub type_spec: String,
    spec: Arc<TypeSpec>,
}

impl FieldMapping {
    /// Build a mapping, parsing the type spec up front so a malformed spec
    /// fails at metadata load rather than on first write.
    pub fn new(
        field_name: impl Into<String>,
        column_name: impl Into<String>,
        type_spec: impl Into<String>,
    ) -> OrmResult<Self> {
        let field_name = field_name.into();
        let type_spec = type_spec.into();
        let spec = TypeCodec::shared()
            .parse(&type_spec)
            .map_err(|e| OrmError::Mapping(format!("field '{field_name}': {e}")))?;

        Ok(Self {
            field_name,
            column_name: column_name.into(),
            type_spec,
            spec,
        })
    }

    pub fn spec(&self) -> &TypeSpec {
        &self.spec
    }
}

/// Primary key of a table: one or more partition key columns followed by
/// optional clustering columns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrimaryKey {
    pub partition: Vec<String>,
    pub clustering: Vec<String>,
}

impl PrimaryKey {
    pub fn new<S: Into<String>>(partition: impl IntoIterator<Item = S>) -> Self {
        Self {
            partition: partition.into_iter().map(Into::into).collect(),
            clustering: Vec::new(),
        }
    }

    pub fn with_clustering<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.clustering = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.partition.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.partition
            .iter()
            .chain(self.clustering.iter())
            .map(String::as_str)
    }
}

/// Renders the key the way it appears inside `PRIMARY KEY (...)`; a
/// composite partition key is wrapped in its own parentheses.
impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.partition.as_slice() {
            [single] => f.write_str(single)?,
            many => write!(f, "({})", many.join(","))?,
        }
        for column in &self.clustering {
            write!(f, ", {column}")?;
        }
        Ok(())
    }
}

/// Immutable mapping descriptor for one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMetadata {
    pub name: String,
    pub table_name: String,
    pub fields: Vec<FieldMapping>,
    pub primary_key: PrimaryKey,
    pub indexes: Vec<String>,
    pub default_ttl: Option<u32>,
    pub insert_if_not_exists: bool,
}

impl EntityMetadata {
    pub fn builder(name: impl Into<String>) -> EntityMetadataBuilder {
        EntityMetadataBuilder::new(name)
    }

    pub fn field(&self, field_name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.field_name == field_name)
    }

    pub fn column(&self, column_name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.column_name == column_name)
    }
}

#[derive(Debug)]
pub struct EntityMetadataBuilder {
    name: String,
    table_name: Option<String>,
    fields: Vec<(String, String, String)>,
    primary_key: PrimaryKey,
    indexes: Vec<String>,
    default_ttl: Option<u32>,
    insert_if_not_exists: bool,
}

impl EntityMetadataBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            fields: Vec::new(),
            primary_key: PrimaryKey::default(),
            indexes: Vec::new(),
            default_ttl: None,
            insert_if_not_exists: false,
        }
    }

    /// Override the table name (defaults to the snake_case entity name)
    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Map a field to the column of the same name
    pub fn field(self, name: impl Into<String>, type_spec: impl Into<String>) -> Self {
        let name = name.into();
        self.column(name.clone(), name, type_spec)
    }

    /// Map a field to an explicitly named column
    pub fn column(
        mut self,
        field_name: impl Into<String>,
        column_name: impl Into<String>,
        type_spec: impl Into<String>,
    ) -> Self {
        self.fields
            .push((field_name.into(), column_name.into(), type_spec.into()));
        self
    }

    pub fn primary_key(mut self, primary_key: PrimaryKey) -> Self {
        self.primary_key = primary_key;
        self
    }

    pub fn index(mut self, column_name: impl Into<String>) -> Self {
        self.indexes.push(column_name.into());
        self
    }

    pub fn default_ttl(mut self, seconds: u32) -> Self {
        self.default_ttl = Some(seconds);
        self
    }

    pub fn insert_if_not_exists(mut self, enabled: bool) -> Self {
        self.insert_if_not_exists = enabled;
        self
    }

    pub fn build(self) -> OrmResult<EntityMetadata> {
        let fields = self
            .fields
            .into_iter()
            .map(|(field, column, spec)| FieldMapping::new(field, column, spec))
            .collect::<OrmResult<Vec<_>>>()?;

        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.field_name == field.field_name) {
                return Err(OrmError::Mapping(format!(
                    "field '{}' is mapped twice on '{}'",
                    field.field_name, self.name
                )));
            }
        }

        let primary_key = if self.primary_key.is_empty() && fields.iter().any(|f| f.column_name == "id") {
            PrimaryKey::new(["id"])
        } else {
            self.primary_key
        };

        for column in primary_key.columns().chain(self.indexes.iter().map(String::as_str)) {
            if !fields.iter().any(|f| f.column_name == column) {
                return Err(OrmError::Mapping(format!(
                    "column '{column}' of '{}' is not mapped",
                    self.name
                )));
            }
        }

        Ok(EntityMetadata {
            table_name: self.table_name.unwrap_or_else(|| to_snake_case(&self.name)),
            name: self.name,
            fields,
            primary_key,
            indexes: self.indexes,
            default_ttl: self.default_ttl,
            insert_if_not_exists: self.insert_if_not_exists,
        })
    }
}

/// `PriceRequest` → `price_request`
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
