//! Store backed by PostgreSQL through the safe SQL builder.

use super::{empty_predicate_error, Model, Predicate, Store};
use crate::error::DomainError;
use crate::sql::{delete_where, insert, select_where, update_by_id, QueryBuf};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    fn prepare(q: &QueryBuf) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        query
    }

    async fn query_many(&self, q: &QueryBuf) -> Result<Vec<Map<String, Value>>, DomainError> {
        let rows = Self::prepare(q).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn query_optional(&self, q: &QueryBuf) -> Result<Option<Map<String, Value>>, DomainError> {
        let row = Self::prepare(q).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_json(&r)))
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, DomainError> {
        let result = Self::prepare(q).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn fetch_all(&self, model: &Model, predicate: &Predicate) -> Result<Vec<Map<String, Value>>, DomainError> {
        self.query_many(&select_where(model, predicate)).await
    }

    async fn fetch_one(&self, model: &Model, predicate: &Predicate) -> Result<Option<Map<String, Value>>, DomainError> {
        let mut q = select_where(model, predicate);
        q.sql.push_str(" LIMIT 1");
        self.query_optional(&q).await
    }

    async fn insert(&self, model: &Model, payload: &Map<String, Value>) -> Result<Map<String, Value>, DomainError> {
        self.query_optional(&insert(model, payload))
            .await?
            .ok_or_else(|| DomainError::storage("NoRowsInsertedError", "No Rows Inserted"))
    }

    async fn replace(&self, model: &Model, payload: &Map<String, Value>) -> Result<Map<String, Value>, DomainError> {
        self.query_optional(&update_by_id(model, payload))
            .await?
            .ok_or(DomainError::NoRowsUpdated)
    }

    async fn delete_one(&self, model: &Model, predicate: &Predicate) -> Result<(), DomainError> {
        match self.execute(&delete_where(model, predicate)).await? {
            0 => Err(DomainError::NoRowsDeleted),
            _ => Ok(()),
        }
    }

    async fn delete_all(&self, model: &Model, predicate: &Predicate) -> Result<(), DomainError> {
        if predicate.is_empty() {
            return Err(empty_predicate_error());
        }
        self.execute(&delete_where(model, predicate)).await?;
        Ok(())
    }
}

fn row_to_json(row: &sqlx::postgres::PgRow) -> Map<String, Value> {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(crate::service::normalize::to_rfc3339(&d));
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return j;
    }
    Value::Null
}
