use scylla::value::CqlValue;
use std::sync::Arc;
use tracing::debug;

use crate::codec::{self, PlainValue, TypeCodec};
use crate::common::{OrmError, OrmResult};
use crate::connection::Connection;
use crate::hydration::{Hydrated, HydrationMode};
use crate::mapping::{Entity, EntityMapping};
use crate::session::{ExecutionOptions, QueryRows, SessionFactory, Statement};

/// Parameterized CQL bound to the mapping of `E`.
///
/// ```ignore
/// let mut query = em.create_query::<User>("SELECT * FROM users WHERE email = ?")?;
/// query.add_parameter("ada@example.com")?;
/// let user = query.get_one_or_null_result(HydrationMode::Object).await?;
/// ```
pub struct Query<E: Entity, F: SessionFactory> {
    connection: Connection<F>,
    mapping: Arc<EntityMapping<E>>,
    cql: String,
    parameters: Vec<CqlValue>,
    options: Option<ExecutionOptions>,
}

impl<E: Entity, F: SessionFactory> Query<E, F> {
    pub fn new(connection: Connection<F>, mapping: Arc<EntityMapping<E>>, cql: impl Into<String>) -> Self {
        Self {
            connection,
            mapping,
            cql: cql.into(),
            parameters: Vec::new(),
            options: None,
        }
    }

    pub fn cql(&self) -> &str {
        &self.cql
    }

    pub fn parameters(&self) -> &[CqlValue] {
        &self.parameters
    }

    /// Bind the next parameter using the value's natural driver type.
    pub fn add_parameter(&mut self, value: impl Into<PlainValue>) -> OrmResult<&mut Self> {
        let position = self.parameters.len();
        let encoded = codec::to_native(&value.into())
            .map_err(|e| OrmError::from(e.for_field(format!("param #{position}"))))?;
        self.parameters.push(encoded);
        Ok(self)
    }

    /// Bind the next parameter, encoding it against `type_spec`.
    pub fn add_parameter_as(
        &mut self,
        value: impl Into<PlainValue>,
        type_spec: &str,
    ) -> OrmResult<&mut Self> {
        let position = self.parameters.len();
        let encoded = TypeCodec::shared()
            .encode(type_spec, &value.into())
            .map_err(|e| OrmError::from(e.for_field(format!("param #{position}"))))?;
        self.parameters.push(encoded);
        Ok(self)
    }

    pub fn set_options(&mut self, options: ExecutionOptions) -> &mut Self {
        self.options = Some(options);
        self
    }

    /// Prepare the statement and run it with the bound parameters.
    pub async fn execute(&self) -> OrmResult<QueryRows> {
        debug!(cql = %self.cql, parameters = self.parameters.len(), "Executing query");

        let prepared = self.connection.prepare(&self.cql).await?;
        self.connection
            .execute(
                Statement::prepared(prepared, self.parameters.clone()),
                self.options.clone(),
            )
            .await
    }

    /// First row, hydrated; `None` when the result is empty.
    pub async fn get_one_or_null_result(&self, mode: HydrationMode) -> OrmResult<Option<Hydrated<E>>> {
        let rows = self.execute().await?;
        rows.first_record()
            .map(|record| mode.hydrator::<E>().hydrate_row(&self.mapping, record))
            .transpose()
    }

    /// Every row hydrated, in result order.
    pub async fn get_result(&self, mode: HydrationMode) -> OrmResult<Vec<Hydrated<E>>> {
        let rows = self.execute().await?;
        let hydrator = mode.hydrator::<E>();
        rows.records()
            .map(|record| hydrator.hydrate_row(&self.mapping, record))
            .collect()
    }

    /// First column of the first row, or `Int(0)` when there are no rows.
    pub async fn get_single_scalar_result(&self) -> OrmResult<PlainValue> {
        let rows = self.execute().await?;
        Ok(rows
            .first_record()
            .and_then(|record| record.into_iter().next().map(|(_, value)| value))
            .unwrap_or(PlainValue::Int(0)))
    }

    pub async fn get_one_or_null_object(&self) -> OrmResult<Option<E>> {
        Ok(self
            .get_one_or_null_result(HydrationMode::Object)
            .await?
            .and_then(Hydrated::into_object))
    }

    pub async fn get_objects(&self) -> OrmResult<Vec<E>> {
        Ok(self
            .get_result(HydrationMode::Object)
            .await?
            .into_iter()
            .filter_map(Hydrated::into_object)
            .collect())
    }
}

impl<E: Entity, F: SessionFactory> std::fmt::Debug for Query<E, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("entity", &self.mapping.metadata().name)
            .field("cql", &self.cql)
            .field("parameters", &self.parameters)
            .finish()
    }
}
