//! Command telemetry
//!
//! An event is opened before a session command is dispatched and published
//! once the command completes. For async commands, completion means the
//! spawned task finished, not the moment the handle was returned.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Session command observed by telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Execute,
    ExecuteAsync,
    Prepare,
    PrepareAsync,
    Close,
    CloseAsync,
    Schema,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Execute => "execute",
            Command::ExecuteAsync => "execute_async",
            Command::Prepare => "prepare",
            Command::PrepareAsync => "prepare_async",
            Command::Close => "close",
            Command::CloseAsync => "close_async",
            Command::Schema => "schema",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CommandEvent {
    pub command: Command,
    pub keyspace: String,
    pub arguments: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub succeeded: Option<bool>,
    started: Instant,
    elapsed: Option<Duration>,
}

impl CommandEvent {
    pub fn start(command: Command, keyspace: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            command,
            keyspace: keyspace.into(),
            arguments,
            started_at: Utc::now(),
            stopped_at: None,
            succeeded: None,
            started: Instant::now(),
            elapsed: None,
        }
    }

    pub fn stop(&mut self, succeeded: bool) {
        self.stopped_at = Some(Utc::now());
        self.elapsed = Some(self.started.elapsed());
        self.succeeded = Some(succeeded);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped_at.is_some()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.elapsed
    }
}

/// Receives completed command events.
#[cfg_attr(test, mockall::automock)]
pub trait TelemetrySink: Send + Sync {
    fn publish(&self, event: &CommandEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn publish(&self, event: &CommandEvent) {
        let duration_ms = event.duration().map(|d| d.as_millis() as u64).unwrap_or(0);
        if event.succeeded == Some(false) {
            warn!(
                command = %event.command,
                keyspace = %event.keyspace,
                arguments = ?event.arguments,
                duration_ms,
                "CASSANDRA command failed"
            );
        } else {
            debug!(
                command = %event.command,
                keyspace = %event.keyspace,
                arguments = ?event.arguments,
                duration_ms,
                "CASSANDRA command"
            );
        }
    }
}

/// Records `cassandra_commands_total` and `cassandra_command_duration_seconds`.
#[cfg(feature = "metrics")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsTelemetry;

#[cfg(feature = "metrics")]
impl TelemetrySink for MetricsTelemetry {
    fn publish(&self, event: &CommandEvent) {
        use metrics::{counter, histogram};

        let status = match event.succeeded {
            Some(false) => "error",
            _ => "success",
        };

        counter!(
            "cassandra_commands_total",
            "command" => event.command.as_str(),
            "keyspace" => event.keyspace.clone(),
            "status" => status
        )
        .increment(1);

        if let Some(duration) = event.duration() {
            histogram!(
                "cassandra_command_duration_seconds",
                "command" => event.command.as_str(),
                "keyspace" => event.keyspace.clone()
            )
            .record(duration.as_secs_f64());
        }
    }
}
