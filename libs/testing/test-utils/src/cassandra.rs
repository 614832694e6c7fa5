//! Cassandra test infrastructure
//!
//! Provides a `TestCassandra` helper that starts a Cassandra container for
//! tests that need a real cluster.

use cassandra_orm::cassandra::CassandraConfig;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

const CQL_PORT: u16 = 9042;

/// Test Cassandra wrapper that ensures proper cleanup
///
/// The container is automatically stopped and removed when this struct is dropped.
///
/// # Example
///
/// ```no_run
/// use test_utils::TestCassandra;
///
/// # async fn example() {
/// let cassandra = TestCassandra::new().await;
/// let config = cassandra.config("system");
/// # }
/// ```
pub struct TestCassandra {
    #[allow(dead_code)]
    container: ContainerAsync<GenericImage>,
    pub contact_point: String,
}

impl TestCassandra {
    /// Start a single-node Cassandra 5 container and wait for CQL clients
    /// to be accepted.
    pub async fn new() -> Self {
        let image = GenericImage::new("cassandra", "5.0")
            .with_exposed_port(CQL_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stdout(
                "Starting listening for CQL clients",
            ))
            .with_env_var("MAX_HEAP_SIZE", "512M")
            .with_env_var("HEAP_NEWSIZE", "128M");

        let container = image
            .start()
            .await
            .expect("Failed to start Cassandra container");

        let host_port = container
            .get_host_port_ipv4(CQL_PORT)
            .await
            .expect("Failed to get Cassandra port");

        let contact_point = format!("127.0.0.1:{}", host_port);
        tracing::info!(port = host_port, "Test Cassandra ready (cassandra 5.0)");

        Self {
            container,
            contact_point,
        }
    }

    /// Connection settings for `keyspace` on this container
    pub fn config(&self, keyspace: &str) -> CassandraConfig {
        CassandraConfig::new(vec![self.contact_point.clone()], keyspace)
            .with_connect_timeout(30)
            .with_retries(2)
    }
}
