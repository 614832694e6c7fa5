use core_config::{ConfigError, FromEnv, env_list, env_optional, env_parse, env_required};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::common::RetryConfig;
use crate::session::Consistency;

/// Host selection policy for the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalancing {
    #[default]
    RoundRobin,
    /// Prefer nodes of the local datacenter; requires `local_datacenter`
    DcAwareRoundRobin,
}

impl FromStr for LoadBalancing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round-robin" => Ok(LoadBalancing::RoundRobin),
            "dc-aware-round-robin" => Ok(LoadBalancing::DcAwareRoundRobin),
            other => Err(format!("unknown load balancing policy '{other}'")),
        }
    }
}

impl fmt::Display for LoadBalancing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadBalancing::RoundRobin => f.write_str("round-robin"),
            LoadBalancing::DcAwareRoundRobin => f.write_str("dc-aware-round-robin"),
        }
    }
}

/// Cassandra/ScyllaDB connection configuration
///
/// Constructed with the builder methods, deserialized from a config file, or
/// loaded from `CASSANDRA_*` environment variables.
///
/// # Example
///
/// ```ignore
/// use cassandra_orm::cassandra::CassandraConfig;
///
/// let config = CassandraConfig::new(vec!["127.0.0.1:9042"], "shop")
///     .with_datacenter("dc1")
///     .with_retries(2);
///
/// // or
/// let config = CassandraConfig::from_env()?;
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CassandraConfig {
    /// Contact points (host:port pairs)
    pub contact_points: Vec<String>,

    /// Keyspace every session is opened over
    pub keyspace: String,

    /// Local datacenter for DC-aware load balancing
    pub local_datacenter: Option<String>,

    pub load_balancing: LoadBalancing,

    /// Route statements to replicas owning their partition
    pub token_aware_routing: bool,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    pub default_consistency: Consistency,

    /// Retry budget for session commands
    pub retries: u32,

    /// Enable SSL/TLS. Not supported yet; [`validate`](Self::validate)
    /// rejects it rather than connecting in plaintext.
    pub ssl_enabled: bool,

    /// Publish command telemetry events
    pub dispatch_events: bool,
}

impl CassandraConfig {
    pub fn new<S: Into<String>>(contact_points: Vec<S>, keyspace: impl Into<String>) -> Self {
        Self {
            contact_points: contact_points.into_iter().map(Into::into).collect(),
            keyspace: keyspace.into(),
            ..Self::default()
        }
    }

    /// Prefer the given datacenter; switches to DC-aware load balancing
    pub fn with_datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.local_datacenter = Some(datacenter.into());
        self.load_balancing = LoadBalancing::DcAwareRoundRobin;
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_ssl(mut self, enabled: bool) -> Self {
        self.ssl_enabled = enabled;
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.default_consistency = consistency;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_dispatch_events(mut self, enabled: bool) -> Self {
        self.dispatch_events = enabled;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new().with_max_retries(self.retries)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keyspace.trim().is_empty() {
            return Err(ConfigError::Invalid("keyspace must not be empty".to_string()));
        }
        if self.contact_points.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one contact point is required".to_string(),
            ));
        }
        if self.load_balancing == LoadBalancing::DcAwareRoundRobin
            && self.local_datacenter.is_none()
        {
            return Err(ConfigError::Invalid(
                "dc-aware-round-robin load balancing requires a local datacenter".to_string(),
            ));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigError::Invalid(
                "username and password must be set together".to_string(),
            ));
        }
        if self.ssl_enabled {
            return Err(ConfigError::Invalid(
                "ssl_enabled is set but TLS connections are not supported".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CassandraConfig {
    fn default() -> Self {
        Self {
            contact_points: vec!["127.0.0.1:9042".to_string()],
            keyspace: String::new(),
            local_datacenter: None,
            load_balancing: LoadBalancing::RoundRobin,
            token_aware_routing: true,
            username: None,
            password: None,
            connect_timeout_secs: 5,
            request_timeout_secs: 5,
            default_consistency: Consistency::One,
            retries: 0,
            ssl_enabled: false,
            dispatch_events: true,
        }
    }
}

/// Load CassandraConfig from environment variables
///
/// Environment variables:
/// - `CASSANDRA_CONTACT_POINTS` (required) - comma-separated host:port list
/// - `CASSANDRA_KEYSPACE` (required)
/// - `CASSANDRA_DATACENTER` (optional)
/// - `CASSANDRA_LOAD_BALANCING` (optional, default: round-robin)
/// - `CASSANDRA_TOKEN_AWARE_ROUTING` (optional, default: true)
/// - `CASSANDRA_USERNAME` / `CASSANDRA_PASSWORD` (optional)
/// - `CASSANDRA_CONNECT_TIMEOUT_SECS` (optional, default: 5)
/// - `CASSANDRA_REQUEST_TIMEOUT_SECS` (optional, default: 5)
/// - `CASSANDRA_CONSISTENCY` (optional, default: one)
/// - `CASSANDRA_RETRIES` (optional, default: 0)
/// - `CASSANDRA_SSL_ENABLED` (optional, default: false)
/// - `CASSANDRA_DISPATCH_EVENTS` (optional, default: true)
impl FromEnv for CassandraConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            contact_points: env_list("CASSANDRA_CONTACT_POINTS")?,
            keyspace: env_required("CASSANDRA_KEYSPACE")?,
            local_datacenter: env_optional("CASSANDRA_DATACENTER"),
            load_balancing: env_parse("CASSANDRA_LOAD_BALANCING", defaults.load_balancing)?,
            token_aware_routing: env_parse(
                "CASSANDRA_TOKEN_AWARE_ROUTING",
                defaults.token_aware_routing,
            )?,
            username: env_optional("CASSANDRA_USERNAME"),
            password: env_optional("CASSANDRA_PASSWORD"),
            connect_timeout_secs: env_parse(
                "CASSANDRA_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            )?,
            request_timeout_secs: env_parse(
                "CASSANDRA_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            default_consistency: env_parse("CASSANDRA_CONSISTENCY", defaults.default_consistency)?,
            retries: env_parse("CASSANDRA_RETRIES", defaults.retries)?,
            ssl_enabled: env_parse("CASSANDRA_SSL_ENABLED", defaults.ssl_enabled)?,
            dispatch_events: env_parse("CASSANDRA_DISPATCH_EVENTS", defaults.dispatch_events)?,
        };

        config.validate()?;
        Ok(config)
    }
}
