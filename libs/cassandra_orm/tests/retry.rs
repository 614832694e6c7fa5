//! Retry executor behaviour against the scripted session

use cassandra_orm::common::{RetryConfig, StoreError, StoreErrorKind};
use cassandra_orm::connection::Connection;
use cassandra_orm::session::Statement;
use test_utils::assertions::assert_store_error;
use test_utils::{ScriptedFactory, SessionCall};

fn connection(factory: &ScriptedFactory, retries: u32) -> Connection<ScriptedFactory> {
    Connection::builder(factory.clone(), "shop")
        .with_max_retries(retries)
        .build()
}

#[tokio::test]
async fn test_exhaustion_discards_exactly_the_budget() {
    for budget in 0..4u32 {
        let factory = ScriptedFactory::new();
        factory.fail_transient(budget + 2);
        let connection = connection(&factory, budget);

        let err = connection.prepare("SELECT now() FROM system.local").await.unwrap_err();
        assert_store_error(&err, StoreErrorKind::Transient, "exhausted budget");
        assert_eq!(
            err.as_store_error().unwrap().message(),
            format!("connection reset #{}", budget + 1),
            "the last failure surfaces unchanged"
        );
        // budget + 1 attempts, each on a fresh session
        assert_eq!(factory.opens(), budget + 1);
        assert_eq!(factory.prepares().len() as u32, budget + 1);
    }
}

#[tokio::test]
async fn test_success_within_budget_uses_fresh_sessions() {
    let factory = ScriptedFactory::new();
    factory.fail_transient(2);
    let connection = connection(&factory, 3);

    let prepared = connection.prepare("SELECT 1").await.unwrap();
    assert_eq!(prepared, "SELECT 1");

    let sessions: Vec<u32> = factory
        .calls()
        .iter()
        .filter_map(|call| match call {
            SessionCall::Prepare { session, .. } => Some(*session),
            _ => None,
        })
        .collect();
    assert_eq!(sessions, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_fatal_error_is_not_retried() {
    let factory = ScriptedFactory::new();
    factory.fail_with(StoreError::fatal("line 1:0 no viable alternative at input 'SELEC'"));
    let connection = connection(&factory, 5);

    let err = connection.prepare("SELEC 1").await.unwrap_err();
    assert_store_error(&err, StoreErrorKind::Fatal, "syntax error");
    assert_eq!(factory.opens(), 1);
    assert_eq!(factory.prepares().len(), 1);
}

#[tokio::test]
async fn test_failed_open_counts_against_the_budget() {
    let factory = ScriptedFactory::new();
    factory.fail_opens(1);
    let connection = connection(&factory, 1);

    connection
        .execute(Statement::simple("SELECT 1"), None)
        .await
        .unwrap();
    assert_eq!(factory.opens(), 1);

    let factory = ScriptedFactory::new();
    factory.fail_opens(2);
    let connection = crate::connection(&factory, 1);
    let err = connection
        .execute(Statement::simple("SELECT 1"), None)
        .await
        .unwrap_err();
    assert_eq!(err.as_store_error().unwrap().message(), "no hosts available #2");
}

#[tokio::test]
async fn test_async_commands_share_the_retry_path() {
    let factory = ScriptedFactory::new();
    factory.fail_transient(1);
    let connection = connection(&factory, 1);

    let pending = connection.execute_async(Statement::simple("SELECT 1"), None);
    pending.await.unwrap();
    assert_eq!(factory.opens(), 2);
    assert_eq!(factory.executes().len(), 2);
}

#[tokio::test]
async fn test_concurrent_failures_on_one_session_open_one_replacement() {
    let factory = ScriptedFactory::new();
    let connection = connection(&factory, 1);
    connection.session().await.unwrap();

    // both callers fail on session 1 before either retries
    factory.rendezvous(2).fail_transient(2);
    let first = connection.execute_async(Statement::simple("SELECT 1"), None);
    let second = connection.execute_async(Statement::simple("SELECT 2"), None);
    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(factory.opens(), 2);
    let mut sessions: Vec<u32> = factory
        .calls()
        .iter()
        .filter_map(|call| match call {
            SessionCall::Execute { session, .. } => Some(*session),
            _ => None,
        })
        .collect();
    sessions.sort_unstable();
    assert_eq!(sessions, vec![1, 1, 2, 2]);
}

#[tokio::test]
async fn test_backoff_delay_does_not_change_attempt_count() {
    let factory = ScriptedFactory::new();
    factory.fail_transient(2);
    let connection = Connection::builder(factory.clone(), "shop")
        .with_retry(RetryConfig::new().with_max_retries(2).with_initial_delay(1))
        .build();

    connection.prepare("SELECT 1").await.unwrap();
    assert_eq!(factory.opens(), 3);
}

#[tokio::test]
async fn test_close_closes_current_session_and_rejects_commands() {
    let factory = ScriptedFactory::new();
    let connection = connection(&factory, 2);
    connection.session().await.unwrap();

    connection.close_async(None).await.unwrap();
    assert_eq!(factory.closes(), 1);

    let err = connection.prepare("SELECT 1").await.unwrap_err();
    assert_store_error(&err, StoreErrorKind::Closed, "after close");
    // closed connections do not reopen
    assert_eq!(factory.opens(), 1);
}

#[tokio::test]
async fn test_schema_is_read_through_the_session() {
    let factory = ScriptedFactory::new();
    let connection = connection(&factory, 0);

    let schema = connection.schema().await.unwrap();
    assert!(!schema.has_table("users"));
}
