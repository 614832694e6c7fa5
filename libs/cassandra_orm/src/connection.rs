//! Connection: the current-session slot plus the retry loop every session
//! command goes through.
//!
//! A transient failure discards the session that failed so the next attempt
//! opens a fresh one. Non-transient failures propagate on first occurrence.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::common::{OrmError, OrmResult, RetryConfig, StoreError};
use crate::session::{
    CqlSession, ExecutionOptions, PreparedOf, QueryRows, SchemaSnapshot, SessionFactory,
    Statement,
};
use crate::telemetry::{Command, CommandEvent, TelemetrySink};

/// Handle to an in-flight asynchronous command.
///
/// Awaiting it yields the command result. Dropping it abandons the handle;
/// the command still runs to completion and its telemetry is still published.
#[derive(Debug)]
pub struct PendingResult<T> {
    state: PendingState<T>,
}

#[derive(Debug)]
enum PendingState<T> {
    Spawned(JoinHandle<OrmResult<T>>),
    Ready(Option<OrmResult<T>>),
}

impl<T: Send + 'static> PendingResult<T> {
    /// Run `future` on the current Tokio runtime and hand back its handle.
    ///
    /// Outside a runtime nothing is spawned and the handle resolves to
    /// [`OrmError::Task`].
    pub(crate) fn spawn<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = OrmResult<T>> + Send + 'static,
    {
        match Handle::try_current() {
            Ok(handle) => Self {
                state: PendingState::Spawned(handle.spawn(future)),
            },
            Err(e) => Self::ready(Err(OrmError::Task(format!(
                "async commands need a Tokio runtime: {e}"
            )))),
        }
    }
}

impl<T> PendingResult<T> {
    /// An already completed command
    pub fn ready(result: OrmResult<T>) -> Self {
        Self {
            state: PendingState::Ready(Some(result)),
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.state {
            PendingState::Spawned(handle) => handle.is_finished(),
            PendingState::Ready(_) => true,
        }
    }
}

// The ready value is moved out, never pinned.
impl<T> Unpin for PendingResult<T> {}

impl<T> Future for PendingResult<T> {
    type Output = OrmResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PendingState::Spawned(handle) => Pin::new(handle)
                .poll(cx)
                .map(|joined| joined.unwrap_or_else(|e| Err(OrmError::Task(e.to_string())))),
            PendingState::Ready(result) => Poll::Ready(
                result
                    .take()
                    .unwrap_or_else(|| Err(OrmError::Task("result already taken".to_string()))),
            ),
        }
    }
}

struct SessionSlot<S> {
    current: Option<Arc<S>>,
    generation: u64,
    closed: bool,
}

/// A session handed out by the slot, tagged with the generation it belongs to.
struct Lease<S> {
    session: Arc<S>,
    generation: u64,
}

struct Inner<F: SessionFactory> {
    factory: F,
    keyspace: String,
    retry: RetryConfig,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    slot: Mutex<SessionSlot<F::Session>>,
}

pub struct ConnectionBuilder<F: SessionFactory> {
    factory: F,
    keyspace: String,
    retry: RetryConfig,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl<F: SessionFactory> ConnectionBuilder<F> {
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Shortcut for a retry budget without backoff
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    pub fn build(self) -> Connection<F> {
        Connection {
            inner: Arc::new(Inner {
                factory: self.factory,
                keyspace: self.keyspace,
                retry: self.retry,
                telemetry: self.telemetry,
                slot: Mutex::new(SessionSlot {
                    current: None,
                    generation: 0,
                    closed: false,
                }),
            }),
        }
    }
}

/// Cheaply cloneable connection to one keyspace.
pub struct Connection<F: SessionFactory> {
    inner: Arc<Inner<F>>,
}

impl<F: SessionFactory> Clone for Connection<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: SessionFactory> std::fmt::Debug for Connection<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("keyspace", &self.inner.keyspace)
            .field("retry", &self.inner.retry)
            .field("telemetry", &self.inner.telemetry.is_some())
            .finish()
    }
}

impl<F: SessionFactory> Connection<F> {
    pub fn builder(factory: F, keyspace: impl Into<String>) -> ConnectionBuilder<F> {
        ConnectionBuilder {
            factory,
            keyspace: keyspace.into(),
            retry: RetryConfig::default(),
            telemetry: None,
        }
    }

    /// Connection without retries or telemetry
    pub fn new(factory: F, keyspace: impl Into<String>) -> Self {
        Self::builder(factory, keyspace).build()
    }

    pub fn keyspace(&self) -> &str {
        &self.inner.keyspace
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.inner.retry
    }

    pub fn max_retry(&self) -> u32 {
        self.inner.retry.max_retries
    }

    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    /// Current session, opening one if none is held.
    pub async fn session(&self) -> OrmResult<Arc<F::Session>> {
        Ok(self.acquire().await?.session)
    }

    /// Drop the current session; the next command opens a new one.
    pub async fn reset_session(&self) {
        let mut slot = self.inner.slot.lock().await;
        if slot.current.take().is_some() {
            debug!(keyspace = %self.inner.keyspace, "Session reset");
        }
    }

    pub async fn execute(
        &self,
        statement: Statement<PreparedOf<F>>,
        options: Option<ExecutionOptions>,
    ) -> OrmResult<QueryRows> {
        let event = self.open_event(Command::Execute, || statement.describe());
        let result = self.run_execute(statement, options).await;
        self.publish(event, result.is_ok());
        result
    }

    pub fn execute_async(
        &self,
        statement: Statement<PreparedOf<F>>,
        options: Option<ExecutionOptions>,
    ) -> PendingResult<QueryRows> {
        let event = self.open_event(Command::ExecuteAsync, || statement.describe());
        let connection = self.clone();
        PendingResult::spawn(async move {
            let result = connection.run_execute(statement, options).await;
            connection.publish(event, result.is_ok());
            result
        })
    }

    pub async fn prepare(&self, cql: &str) -> OrmResult<PreparedOf<F>> {
        let event = self.open_event(Command::Prepare, || vec![cql.to_string()]);
        let result = self.run_prepare(cql.to_string()).await;
        self.publish(event, result.is_ok());
        result
    }

    pub fn prepare_async(&self, cql: impl Into<String>) -> PendingResult<PreparedOf<F>> {
        let cql = cql.into();
        let event = self.open_event(Command::PrepareAsync, || vec![cql.clone()]);
        let connection = self.clone();
        PendingResult::spawn(async move {
            let result = connection.run_prepare(cql).await;
            connection.publish(event, result.is_ok());
            result
        })
    }

    pub async fn schema(&self) -> OrmResult<SchemaSnapshot> {
        let event = self.open_event(Command::Schema, Vec::new);
        let result = self
            .send(|session| async move { session.schema().await })
            .await;
        self.publish(event, result.is_ok());
        result
    }

    /// Close the connection for good. Later commands fail with a `Closed`
    /// store error.
    pub async fn close(&self, timeout: Option<Duration>) -> OrmResult<()> {
        let event = self.open_event(Command::Close, Vec::new);
        let result = self.run_close(timeout).await;
        self.publish(event, result.is_ok());
        result
    }

    pub fn close_async(&self, timeout: Option<Duration>) -> PendingResult<()> {
        let event = self.open_event(Command::CloseAsync, Vec::new);
        let connection = self.clone();
        PendingResult::spawn(async move {
            let result = connection.run_close(timeout).await;
            connection.publish(event, result.is_ok());
            result
        })
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.slot.lock().await.closed
    }

    async fn run_execute(
        &self,
        statement: Statement<PreparedOf<F>>,
        options: Option<ExecutionOptions>,
    ) -> OrmResult<QueryRows> {
        let statement = Arc::new(statement);
        let options = options.map(Arc::new);
        self.send(|session| {
            let statement = Arc::clone(&statement);
            let options = options.clone();
            async move { session.execute(&statement, options.as_deref()).await }
        })
        .await
    }

    async fn run_prepare(&self, cql: String) -> OrmResult<PreparedOf<F>> {
        let cql = Arc::new(cql);
        self.send(|session| {
            let cql = Arc::clone(&cql);
            async move { session.prepare(&cql).await }
        })
        .await
    }

    async fn run_close(&self, timeout: Option<Duration>) -> OrmResult<()> {
        let session = {
            let mut slot = self.inner.slot.lock().await;
            slot.closed = true;
            slot.current.take()
        };

        info!(keyspace = %self.inner.keyspace, "Closing connection");
        match session {
            Some(session) => Ok(session.close(timeout).await?),
            None => Ok(()),
        }
    }

    /// Run `op` against the current session, retrying transient failures on
    /// a fresh session until the budget is spent.
    async fn send<T, Op, Fut>(&self, op: Op) -> OrmResult<T>
    where
        Op: Fn(Arc<F::Session>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut remaining = self.inner.retry.max_retries;
        let mut retry = 0;

        loop {
            let (error, lease) = match self.acquire().await {
                Ok(lease) => match op(Arc::clone(&lease.session)).await {
                    Ok(value) => return Ok(value),
                    Err(error) => (error, Some(lease)),
                },
                Err(error) => (error, None),
            };

            if !error.is_transient() {
                return Err(error.into());
            }
            if remaining == 0 {
                if self.inner.retry.max_retries > 0 {
                    warn!(
                        keyspace = %self.inner.keyspace,
                        retries = self.inner.retry.max_retries,
                        error = %error,
                        "Retries exhausted"
                    );
                }
                return Err(error.into());
            }

            if let Some(lease) = lease {
                self.invalidate(&lease).await;
            }
            remaining -= 1;
            retry += 1;
            warn!(
                keyspace = %self.inner.keyspace,
                remaining,
                error = %error,
                "Transient failure, discarding session and retrying"
            );

            let delay = self.inner.retry.delay_for(retry);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn acquire(&self) -> Result<Lease<F::Session>, StoreError> {
        let mut slot = self.inner.slot.lock().await;
        if slot.closed {
            return Err(StoreError::closed());
        }

        if let Some(session) = &slot.current {
            return Ok(Lease {
                session: Arc::clone(session),
                generation: slot.generation,
            });
        }

        let session = Arc::new(self.inner.factory.open(&self.inner.keyspace).await?);
        slot.generation += 1;
        slot.current = Some(Arc::clone(&session));
        info!(
            keyspace = %self.inner.keyspace,
            generation = slot.generation,
            "Opened session"
        );

        Ok(Lease {
            session,
            generation: slot.generation,
        })
    }

    /// Discard the leased session unless it has already been replaced by a
    /// concurrent caller.
    async fn invalidate(&self, lease: &Lease<F::Session>) {
        let mut slot = self.inner.slot.lock().await;
        if slot.generation == lease.generation && slot.current.is_some() {
            slot.current = None;
        }
    }

    fn open_event(
        &self,
        command: Command,
        arguments: impl FnOnce() -> Vec<String>,
    ) -> Option<CommandEvent> {
        self.inner
            .telemetry
            .as_ref()
            .map(|_| CommandEvent::start(command, self.inner.keyspace.clone(), arguments()))
    }

    fn publish(&self, event: Option<CommandEvent>, succeeded: bool) {
        if let (Some(sink), Some(mut event)) = (&self.inner.telemetry, event) {
            event.stop(succeeded);
            sink.publish(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::StoreErrorKind;
    use crate::telemetry::MockTelemetrySink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails every prepare with the configured error until `failures` is spent.
    struct FlakySession {
        failures: Arc<AtomicU32>,
        kind: StoreErrorKind,
    }

    #[async_trait]
    impl CqlSession for FlakySession {
        type Prepared = String;

        async fn prepare(&self, cql: &str) -> Result<String, StoreError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::new(self.kind, format!("failure #{left}")));
            }
            Ok(cql.to_string())
        }

        async fn execute(
            &self,
            _statement: &Statement<String>,
            _options: Option<&ExecutionOptions>,
        ) -> Result<QueryRows, StoreError> {
            Ok(QueryRows::default())
        }

        async fn close(&self, _timeout: Option<Duration>) -> Result<(), StoreError> {
            Ok(())
        }

        async fn schema(&self) -> Result<SchemaSnapshot, StoreError> {
            Ok(SchemaSnapshot::default())
        }
    }

    struct FlakyFactory {
        opens: Arc<AtomicU32>,
        failures: Arc<AtomicU32>,
        kind: StoreErrorKind,
    }

    impl FlakyFactory {
        fn new(failures: u32, kind: StoreErrorKind) -> Self {
            Self {
                opens: Arc::new(AtomicU32::new(0)),
                failures: Arc::new(AtomicU32::new(failures)),
                kind,
            }
        }
    }

    #[async_trait]
    impl SessionFactory for FlakyFactory {
        type Session = FlakySession;

        async fn open(&self, _keyspace: &str) -> Result<FlakySession, StoreError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(FlakySession {
                failures: Arc::clone(&self.failures),
                kind: self.kind,
            })
        }
    }

    #[tokio::test]
    async fn test_session_is_opened_lazily_and_reused() {
        let connection = Connection::new(FlakyFactory::new(0, StoreErrorKind::Transient), "shop");
        assert_eq!(connection.factory().opens.load(Ordering::SeqCst), 0);

        connection.prepare("SELECT 1").await.unwrap();
        connection.prepare("SELECT 2").await.unwrap();
        assert_eq!(connection.factory().opens.load(Ordering::SeqCst), 1);

        connection.reset_session().await;
        connection.prepare("SELECT 3").await.unwrap();
        assert_eq!(connection.factory().opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_async_command_outside_runtime_resolves_to_task_error() {
        let connection = Connection::new(FlakyFactory::new(0, StoreErrorKind::Transient), "shop");

        let pending = connection.prepare_async("SELECT 1");
        assert!(pending.is_finished());
        let err = futures::executor::block_on(pending).unwrap_err();
        assert!(matches!(err, OrmError::Task(message) if message.contains("Tokio runtime")));
        assert_eq!(connection.factory().opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retry_within_budget_succeeds() {
        let connection = Connection::builder(FlakyFactory::new(2, StoreErrorKind::Transient), "shop")
            .with_max_retries(2)
            .build();

        assert_eq!(connection.prepare("SELECT 1").await.unwrap(), "SELECT 1");
        assert_eq!(connection.factory().opens.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget_surfaces_last_error() {
        let connection = Connection::builder(FlakyFactory::new(3, StoreErrorKind::Transient), "shop")
            .with_max_retries(1)
            .build();

        let err = connection.prepare("SELECT 1").await.unwrap_err();
        let store = err.as_store_error().unwrap();
        assert!(store.is_transient());
        assert_eq!(store.message(), "failure #2");
        // The last failing session is kept; only `budget` sessions were discarded.
        assert_eq!(connection.factory().opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let connection = Connection::builder(FlakyFactory::new(1, StoreErrorKind::Fatal), "shop")
            .with_max_retries(5)
            .build();

        let err = connection.prepare("SELEC 1").await.unwrap_err();
        assert_eq!(err.as_store_error().unwrap().kind(), StoreErrorKind::Fatal);
        assert_eq!(connection.factory().opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_is_permanent() {
        let connection = Connection::new(FlakyFactory::new(0, StoreErrorKind::Transient), "shop");
        connection.prepare("SELECT 1").await.unwrap();
        connection.close(None).await.unwrap();

        assert!(connection.is_closed().await);
        let err = connection.prepare("SELECT 1").await.unwrap_err();
        assert_eq!(err.as_store_error().unwrap().kind(), StoreErrorKind::Closed);
    }

    #[tokio::test]
    async fn test_async_prepare_publishes_on_completion() {
        let mut sink = MockTelemetrySink::new();
        sink.expect_publish()
            .withf(|event| {
                event.command == Command::PrepareAsync
                    && event.keyspace == "shop"
                    && event.arguments == vec!["SELECT 1".to_string()]
                    && event.is_stopped()
            })
            .times(1)
            .return_const(());

        let connection = Connection::builder(FlakyFactory::new(0, StoreErrorKind::Transient), "shop")
            .with_telemetry(Arc::new(sink))
            .build();

        let prepared = connection.prepare_async("SELECT 1").await.unwrap();
        assert_eq!(prepared, "SELECT 1");
    }

    #[tokio::test]
    async fn test_failed_command_is_published_as_failed() {
        let mut sink = MockTelemetrySink::new();
        sink.expect_publish()
            .withf(|event| event.command == Command::Prepare && event.succeeded == Some(false))
            .times(1)
            .return_const(());

        let connection = Connection::builder(FlakyFactory::new(1, StoreErrorKind::Fatal), "shop")
            .with_telemetry(Arc::new(sink))
            .build();

        assert!(connection.prepare("SELECT 1").await.is_err());
    }
}
