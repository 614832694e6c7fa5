use std::time::Instant;

use crate::codec::PlainValue;
use crate::connection::Connection;
use crate::session::{SessionFactory, Statement};

const HEALTH_QUERY: &str = "SELECT release_version FROM system.local";

/// Health check status for a connection
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the store answered
    pub healthy: bool,
    /// Error details when unhealthy
    pub message: Option<String>,
    /// Response time in milliseconds
    pub response_time_ms: u64,
    /// Cassandra release version (if available)
    pub version: Option<String>,
}

impl<F: SessionFactory> Connection<F> {
    /// Run a lightweight query through the retry path and report timing,
    /// version and any error message.
    ///
    /// # Example
    /// ```ignore
    /// let status = connection.check_health().await;
    /// if !status.healthy {
    ///     tracing::warn!("Cassandra unhealthy: {:?}", status.message);
    /// }
    /// ```
    pub async fn check_health(&self) -> HealthStatus {
        let start = Instant::now();

        match self.execute(Statement::simple(HEALTH_QUERY), None).await {
            Ok(rows) => HealthStatus {
                healthy: true,
                message: None,
                response_time_ms: start.elapsed().as_millis() as u64,
                version: rows
                    .first_record()
                    .and_then(|record| record.first().and_then(PlainValue::as_str).map(str::to_string)),
            },
            Err(e) => HealthStatus {
                healthy: false,
                message: Some(e.to_string()),
                response_time_ms: start.elapsed().as_millis() as u64,
                version: None,
            },
        }
    }
}
