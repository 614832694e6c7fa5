use core_config::ConfigError;

/// How a failure reported by the store should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Connection or session level failure; the command may be retried on a fresh session
    Transient,
    /// Semantic failure (bad CQL, invalid request, unauthorized); never retried
    Fatal,
    /// The connection was closed explicitly
    Closed,
}

/// Error reported by a session implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StoreError {
    kind: StoreErrorKind,
    message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Fatal, message)
    }

    pub fn closed() -> Self {
        Self::new(StoreErrorKind::Closed, "connection has been closed")
    }

    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_transient(&self) -> bool {
        self.kind == StoreErrorKind::Transient
    }
}

/// A value could not be encoded against its declared type spec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "cannot encode {} as `{type_spec}`: {message}",
    .field.as_ref().map_or_else(|| "value".to_string(), |field| format!("`{field}`"))
)]
pub struct TypeError {
    pub field: Option<String>,
    pub type_spec: String,
    pub message: String,
}

impl TypeError {
    pub fn new(type_spec: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: None,
            type_spec: type_spec.into(),
            message: message.into(),
        }
    }

    /// Attach the field (or parameter) the failing value belongs to.
    pub fn for_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Unified error type for the ORM layer
#[derive(Debug, thiserror::Error)]
pub enum OrmError {
    /// Failure reported by the store, surfaced unchanged once retries are exhausted
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Value/type-spec mismatch while encoding
    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("'{0}' is an invalid hydration mode")]
    InvalidHydrationMode(u8),

    #[error("cannot hydrate {entity}.{field} (`{type_spec}`): {message}")]
    Hydration {
        entity: String,
        field: String,
        type_spec: String,
        message: String,
    },

    /// Entity metadata is inconsistent (unknown accessor, malformed type spec, ...)
    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("No metadata registered for entity '{0}'")]
    UnknownEntity(String),

    #[error("Entity '{entity}' has no identifier value")]
    MissingIdentifier { entity: String },

    /// An asynchronous command could not be joined
    #[error("Async command failed: {0}")]
    Task(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl OrmError {
    /// The store error behind this failure, if any
    pub fn as_store_error(&self) -> Option<&StoreError> {
        match self {
            OrmError::Store(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for ORM operations
pub type OrmResult<T> = Result<T, OrmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_kinds() {
        assert!(StoreError::transient("connection reset").is_transient());
        assert!(!StoreError::fatal("syntax error").is_transient());
        assert_eq!(StoreError::closed().kind(), StoreErrorKind::Closed);
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err = OrmError::from(StoreError::transient("node down"));
        assert_eq!(err.to_string(), "node down");
        assert!(err.as_store_error().is_some());
    }

    #[test]
    fn test_type_error_names_field_and_spec() {
        let err = TypeError::new("set<int>", "expected a list").for_field("tags");
        let message = OrmError::from(err).to_string();
        assert!(message.contains("tags"));
        assert!(message.contains("set<int>"));
        assert_eq!(message, "cannot encode `tags` as `set<int>`: expected a list");

        let err = TypeError::new("int", "out of range");
        assert_eq!(err.to_string(), "cannot encode value as `int`: out of range");
    }
}
