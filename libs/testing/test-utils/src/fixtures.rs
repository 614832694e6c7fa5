//! Entity fixtures shared by integration tests

use cassandra_orm::codec;
use cassandra_orm::common::OrmResult;
use cassandra_orm::mapping::{AccessorTable, Entity, EntityMapping, EntityMetadata};
use cassandra_orm::session::QueryRows;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Every field is optional so tests can leave any of them unset.
///
/// `email` is stored in the `email_address` column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: Option<Uuid>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub age: Option<i32>,
    pub tags: Option<BTreeSet<String>>,
    pub scores: Option<BTreeMap<String, Vec<i64>>>,
}

impl Entity for User {
    fn metadata() -> OrmResult<EntityMetadata> {
        EntityMetadata::builder("User")
            .table("users")
            .field("id", "uuid")
            .field("name", "text")
            .column("email", "email_address", "text")
            .field("age", "int")
            .field("tags", "set<text>")
            .field("scores", "map<text, list<bigint>>")
            .index("email_address")
            .build()
    }

    fn accessors() -> AccessorTable<Self> {
        cassandra_orm::accessors!(User {
            id,
            name,
            email,
            age,
            tags,
            scores
        })
    }
}

/// Time-series row keyed by a composite partition key plus a clustering
/// column; exercises the default snake_case table name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceRequest {
    pub region: Option<String>,
    pub day: Option<String>,
    pub requested_at: Option<i64>,
    pub amount: Option<f64>,
}

impl Entity for PriceRequest {
    fn metadata() -> OrmResult<EntityMetadata> {
        EntityMetadata::builder("PriceRequest")
            .field("region", "text")
            .field("day", "date")
            .field("requested_at", "bigint")
            .field("amount", "double")
            .primary_key(
                cassandra_orm::mapping::PrimaryKey::new(["region", "day"])
                    .with_clustering(["requested_at"]),
            )
            .default_ttl(86_400)
            .build()
    }

    fn accessors() -> AccessorTable<Self> {
        cassandra_orm::accessors!(PriceRequest {
            region,
            day,
            requested_at,
            amount
        })
    }
}

/// Encode entities into the rows a session would return for
/// `SELECT <all mapped columns>`. Unset fields come back as null columns.
pub fn rows_of<E: Entity>(entities: &[E]) -> OrmResult<QueryRows> {
    let mapping = EntityMapping::new(E::metadata()?, E::accessors())?;
    let fields = &mapping.metadata().fields;
    let columns = fields.iter().map(|f| f.column_name.clone()).collect();

    let mut rows = Vec::with_capacity(entities.len());
    for entity in entities {
        let mut row = Vec::with_capacity(fields.len());
        for field in fields {
            let value = (mapping.accessor(field)?.get)(entity);
            row.push(
                value
                    .map(|v| codec::encode(field.spec(), &v))
                    .transpose()?,
            );
        }
        rows.push(row);
    }

    Ok(QueryRows::new(columns, rows))
}

/// A fully populated user
pub fn sample_user(id: Uuid) -> User {
    User {
        id: Some(id),
        name: Some("Ada Lovelace".to_string()),
        email: Some("ada@example.com".to_string()),
        age: Some(36),
        tags: Some(["admin", "ops"].iter().map(|s| s.to_string()).collect()),
        scores: Some(
            [("q1".to_string(), vec![3, 5]), ("q2".to_string(), vec![8])]
                .into_iter()
                .collect(),
        ),
    }
}
