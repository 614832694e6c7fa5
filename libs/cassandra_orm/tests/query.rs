//! Query execution, hydration and repositories

use cassandra_orm::codec::PlainValue;
use cassandra_orm::common::{OrmError, OrmResult};
use cassandra_orm::connection::Connection;
use cassandra_orm::hydration::{Hydrated, HydrationMode};
use cassandra_orm::mapping::{AccessorTable, Entity, EntityMetadata};
use cassandra_orm::orm::EntityManager;
use cassandra_orm::session::QueryRows;
use scylla::value::CqlValue;
use std::collections::BTreeMap;
use test_utils::fixtures::{User, rows_of};
use test_utils::{ExecutedStatement, ScriptedFactory, TestDataBuilder};
use uuid::Uuid;

fn manager(factory: &ScriptedFactory) -> EntityManager<ScriptedFactory> {
    EntityManager::new(Connection::new(factory.clone(), "shop"))
}

#[tokio::test]
async fn test_object_hydration_round_trips_every_field() {
    let data = TestDataBuilder::from_test_name("test_object_hydration_round_trips_every_field");
    let users = vec![data.user(1), data.user(2)];
    let factory = ScriptedFactory::new();
    factory.respond_to("FROM users", rows_of(&users).unwrap());
    let em = manager(&factory);

    let query = em.create_query::<User>("SELECT * FROM users").unwrap();
    let result = query.get_result(HydrationMode::Object).await.unwrap();

    let hydrated: Vec<User> = result.into_iter().filter_map(Hydrated::into_object).collect();
    assert_eq!(hydrated, users);
    // prepare first, then execute the prepared statement
    assert_eq!(factory.prepares(), vec!["SELECT * FROM users".to_string()]);
    assert!(matches!(factory.executes()[0], ExecutedStatement::Prepared { .. }));
}

#[tokio::test]
async fn test_missing_columns_leave_fields_unset() {
    let data = TestDataBuilder::new(21);
    let id = data.id(1);
    let factory = ScriptedFactory::new();
    factory.respond_to(
        "FROM users",
        QueryRows::new(
            vec!["id".to_string(), "email_address".to_string()],
            vec![vec![
                Some(CqlValue::Uuid(id)),
                Some(CqlValue::Text("ada@example.com".to_string())),
            ]],
        ),
    );
    let em = manager(&factory);
    let query = em
        .create_query::<User>("SELECT id, email_address FROM users")
        .unwrap();

    let user = query.get_one_or_null_object().await.unwrap().unwrap();
    assert_eq!(user.id, Some(id));
    assert_eq!(user.email.as_deref(), Some("ada@example.com"));
    assert_eq!(user.name, None);
    assert_eq!(user.tags, None);

    let record = query
        .get_one_or_null_result(HydrationMode::Associative)
        .await
        .unwrap()
        .and_then(Hydrated::into_record)
        .unwrap();
    // keyed by field name, only present columns
    assert_eq!(record.keys().collect::<Vec<_>>(), vec!["id", "email"]);
    assert_eq!(record.get("id"), Some(&PlainValue::Text(id.to_string())));
}

#[tokio::test]
async fn test_empty_results() {
    let factory = ScriptedFactory::new();
    let em = manager(&factory);
    let query = em.create_query::<User>("SELECT * FROM users").unwrap();

    assert!(query
        .get_one_or_null_result(HydrationMode::Object)
        .await
        .unwrap()
        .is_none());
    assert!(query
        .get_result(HydrationMode::Associative)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        query.get_single_scalar_result().await.unwrap(),
        PlainValue::Int(0)
    );
}

#[tokio::test]
async fn test_scalar_result_is_first_column_of_first_row() {
    let factory = ScriptedFactory::new();
    factory.respond_to(
        "count(*)",
        QueryRows::new(
            vec!["count".to_string(), "max".to_string()],
            vec![
                vec![Some(CqlValue::BigInt(42)), Some(CqlValue::Int(7))],
                vec![Some(CqlValue::BigInt(1)), None],
            ],
        ),
    );
    let em = manager(&factory);
    let query = em
        .create_query::<User>("SELECT count(*), max(age) FROM users")
        .unwrap();

    assert_eq!(
        query.get_single_scalar_result().await.unwrap(),
        PlainValue::Int(42)
    );
}

#[derive(Debug, Default, PartialEq)]
struct Account {
    id: Option<Uuid>,
    nickname: String,
    logins: i64,
}

impl Entity for Account {
    fn metadata() -> OrmResult<EntityMetadata> {
        EntityMetadata::builder("Account")
            .field("id", "uuid")
            .field("nickname", "text")
            .field("logins", "bigint")
            .build()
    }

    fn accessors() -> AccessorTable<Self> {
        cassandra_orm::accessors!(Account { id, nickname, logins })
    }
}

#[tokio::test]
async fn test_null_cells_leave_plain_fields_at_default() {
    let id = TestDataBuilder::new(25).id(1);
    let factory = ScriptedFactory::new();
    // columns left out of an insert come back as null cells
    factory.respond_to(
        "FROM accounts",
        QueryRows::new(
            vec!["id".to_string(), "nickname".to_string(), "logins".to_string()],
            vec![vec![Some(CqlValue::Uuid(id)), None, Some(CqlValue::BigInt(3))]],
        ),
    );
    let em = manager(&factory);

    let account = em
        .create_query::<Account>("SELECT * FROM accounts")
        .unwrap()
        .get_one_or_null_object()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        account,
        Account {
            id: Some(id),
            nickname: String::new(),
            logins: 3,
        }
    );
}

#[tokio::test]
async fn test_nested_collection_hydrates() {
    let factory = ScriptedFactory::new();
    factory.respond_to(
        "FROM users",
        QueryRows::new(
            vec!["scores".to_string()],
            vec![vec![Some(CqlValue::Map(vec![(
                CqlValue::Text("q1".to_string()),
                CqlValue::List(vec![CqlValue::BigInt(1), CqlValue::BigInt(2)]),
            )]))]],
        ),
    );
    let em = manager(&factory);

    let user = em
        .create_query::<User>("SELECT scores FROM users")
        .unwrap()
        .get_one_or_null_object()
        .await
        .unwrap()
        .unwrap();
    let expected: BTreeMap<String, Vec<i64>> = [("q1".to_string(), vec![1, 2])].into_iter().collect();
    assert_eq!(user.scores, Some(expected));
}

#[tokio::test]
async fn test_incompatible_column_is_a_hydration_error() {
    let factory = ScriptedFactory::new();
    factory.respond_to(
        "FROM users",
        QueryRows::new(
            vec!["age".to_string()],
            vec![vec![Some(CqlValue::Text("old".to_string()))]],
        ),
    );
    let em = manager(&factory);

    let err = em
        .create_query::<User>("SELECT age FROM users")
        .unwrap()
        .get_objects()
        .await
        .unwrap_err();
    match err {
        OrmError::Hydration { field, type_spec, .. } => {
            assert_eq!(field, "age");
            assert_eq!(type_spec, "int");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_parameters_are_bound_in_order() {
    let data = TestDataBuilder::new(22);
    let factory = ScriptedFactory::new();
    let em = manager(&factory);

    let mut query = em
        .create_query::<User>("SELECT * FROM users WHERE id = ? AND age > ?")
        .unwrap();
    query
        .add_parameter_as(data.id(1), "uuid")
        .unwrap()
        .add_parameter(30i64)
        .unwrap();
    query.execute().await.unwrap();

    assert_eq!(
        factory.executes()[0].values(),
        &[CqlValue::Uuid(data.id(1)), CqlValue::BigInt(30)]
    );
}

#[tokio::test]
async fn test_untyped_parameters_keep_their_driver_type() {
    let data = TestDataBuilder::new(26);
    let factory = ScriptedFactory::new();
    let em = manager(&factory);

    let mut query = em
        .create_query::<User>("SELECT * FROM users WHERE id = ? AND age = ?")
        .unwrap();
    query.add_parameter(data.id(1)).unwrap().add_parameter(36i32).unwrap();
    query.execute().await.unwrap();

    assert_eq!(
        factory.executes()[0].values(),
        &[CqlValue::Uuid(data.id(1)), CqlValue::Int(36)]
    );
}

#[tokio::test]
async fn test_bad_parameter_names_its_position() {
    let factory = ScriptedFactory::new();
    let em = manager(&factory);
    let mut query = em
        .create_query::<User>("SELECT * FROM users WHERE age = ?")
        .unwrap();

    let err = query.add_parameter_as("thirty", "int").unwrap_err();
    match err {
        OrmError::Type(e) => {
            assert_eq!(e.field.as_deref(), Some("param #0"));
            assert_eq!(e.type_spec, "int");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(query.parameters().is_empty());
}

#[test]
fn test_unknown_hydration_mode_is_rejected() {
    let err = HydrationMode::try_from(3u8).unwrap_err();
    assert_eq!(err.to_string(), "'3' is an invalid hydration mode");
    assert_eq!(HydrationMode::try_from(2u8).unwrap(), HydrationMode::Associative);
}

#[tokio::test]
async fn test_repository_find_and_find_all() {
    let data = TestDataBuilder::new(23);
    let user = data.user(1);
    let factory = ScriptedFactory::new();
    factory.respond_to("WHERE id = ?", rows_of(&[user.clone()]).unwrap());
    factory.respond_to("FROM \"shop\".\"users\"", rows_of(&[user.clone(), data.user(2)]).unwrap());
    let em = manager(&factory);
    let repository = em.get_repository::<User>().unwrap();

    let found = repository.find(user.id.unwrap()).await.unwrap();
    assert_eq!(found, Some(user.clone()));
    assert_eq!(
        factory.prepares(),
        vec![
            "SELECT id, name, email_address, age, tags, scores FROM \"shop\".\"users\" WHERE id = ?"
                .to_string()
        ]
    );
    assert_eq!(factory.executes()[0].values(), &[CqlValue::Uuid(user.id.unwrap())]);

    let all = repository.find_all().await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_repository_find_missing_row() {
    let factory = ScriptedFactory::new();
    let em = manager(&factory);

    let found = em
        .get_repository::<User>()
        .unwrap()
        .find(TestDataBuilder::new(24).id(9))
        .await
        .unwrap();
    assert_eq!(found, None);
}
