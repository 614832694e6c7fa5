//! Shared test utilities for the cassandra_orm crate
//!
//! - `ScriptedFactory`: in-memory session boundary that records every call
//!   and can be scripted to fail (always available)
//! - `fixtures`: sample entities and row builders (always available)
//! - `TestDataBuilder`: deterministic test data generation (always available)
//! - `assertions`: custom assertion helpers (always available)
//! - `TestCassandra`: Cassandra container with automatic cleanup (feature: "cassandra")
//!
//! # Usage
//!
//! ```rust,ignore
//! use cassandra_orm::connection::Connection;
//! use test_utils::ScriptedFactory;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let factory = ScriptedFactory::new();
//!     factory.fail_transient(1);
//!
//!     let connection = Connection::builder(factory.clone(), "shop")
//!         .with_max_retries(1)
//!         .build();
//!     connection.prepare("SELECT 1").await.unwrap();
//!     assert_eq!(factory.opens(), 2);
//! }
//! ```

use std::sync::Once;
use uuid::Uuid;

#[cfg(feature = "cassandra")]
mod cassandra;
pub mod fixtures;
mod scripted;

#[cfg(feature = "cassandra")]
pub use cassandra::TestCassandra;
pub use scripted::{ExecutedStatement, ScriptedFactory, ScriptedSession, SessionCall};

static TRACING: Once = Once::new();

/// Install a test subscriber once per process; `RUST_LOG` overrides the
/// default `warn` filter.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    TRACING.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_test_writer()
            .try_init();
    });
}

/// Builder for test data with deterministic randomization
///
/// This ensures tests are reproducible by using seeded data.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_flush_batches");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Deterministic id; `n` distinguishes ids within one test
    pub fn id(&self, n: u64) -> Uuid {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.seed.to_le_bytes());
        bytes[8..].copy_from_slice(&n.to_le_bytes());
        Uuid::from_bytes(bytes)
    }

    /// Keyspace name unique to this test (lowercase, valid CQL identifier)
    pub fn keyspace(&self) -> String {
        format!("test_{:x}", self.seed)
    }

    /// Generate a unique name for testing
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::new(7);
    /// assert_eq!(builder.name("user", "main"), "test-user-7-main");
    /// ```
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }

    /// A populated user whose id and email derive from `n`
    pub fn user(&self, n: u64) -> fixtures::User {
        let mut user = fixtures::sample_user(self.id(n));
        user.email = Some(format!("{}@example.com", self.name("user", &n.to_string())));
        user
    }
}

/// Test assertion helpers
pub mod assertions {
    use cassandra_orm::common::{OrmError, StoreErrorKind};

    use crate::SessionCall;

    /// Assert that an error is a store error of the given kind
    pub fn assert_store_error(err: &OrmError, kind: StoreErrorKind, context: &str) {
        match err.as_store_error() {
            Some(store) => assert_eq!(
                store.kind(),
                kind,
                "{}: expected {:?} store error, got {:?}",
                context,
                kind,
                store
            ),
            None => panic!("{}: expected a store error, got {:?}", context, err),
        }
    }

    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }

    /// Assert that the recorded calls contain no executes
    pub fn assert_nothing_executed(calls: &[SessionCall], context: &str) {
        let executes = calls
            .iter()
            .filter(|call| matches!(call, SessionCall::Execute { .. }))
            .count();
        assert_eq!(executes, 0, "{}: expected no executes, got {}", context, executes);
    }
}
