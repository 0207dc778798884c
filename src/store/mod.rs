//! Storage collaborator: the only interface the engine uses to reach persistence.
//!
//! Every map a store sees is keyed by column name (snake_case); every row it returns is too.

mod memory;
mod postgres;

pub use memory::{MemoryStore, StoreCall};
pub use postgres::PgStore;

use crate::error::DomainError;
use crate::service::validation::value_eq;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Handle to the stored model behind a resource.
#[derive(Clone, Debug)]
pub struct Model {
    pub schema: Option<String>,
    pub table: String,
    pub id_column: String,
    /// SQL type per column, used to cast bound string values (e.g. "timestamptz").
    pub casts: BTreeMap<String, String>,
}

impl Model {
    pub fn new(table: impl Into<String>) -> Self {
        Model {
            schema: None,
            table: table.into(),
            id_column: "id".into(),
            casts: BTreeMap::new(),
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    NotEq(String, Value),
}

impl Condition {
    fn matches(&self, row: &Map<String, Value>) -> bool {
        let cell = |c: &str| row.get(c).unwrap_or(&Value::Null);
        match self {
            Condition::Eq(c, v) => value_eq(cell(c), v),
            Condition::NotEq(c, v) => !cell(c).is_null() && !value_eq(cell(c), v),
        }
    }
}

/// Conjunction of column conditions. An empty predicate matches every row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Predicate {
    pub conditions: Vec<Condition>,
}

impl Predicate {
    pub fn new() -> Self {
        Predicate::default()
    }

    /// Equality on every entry of a column -> value map.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Predicate {
            conditions: map
                .iter()
                .map(|(k, v)| Condition::Eq(k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn eq(mut self, column: impl Into<String>, value: Value) -> Self {
        self.conditions.push(Condition::Eq(column.into(), value));
        self
    }

    pub fn not_eq(mut self, column: impl Into<String>, value: Value) -> Self {
        self.conditions.push(Condition::NotEq(column.into(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }
}

/// Persistence operations. Implementations report failures as [`DomainError`]s, which the engine
/// turns into 400 responses.
#[async_trait]
pub trait Store: Send + Sync {
    async fn fetch_all(&self, model: &Model, predicate: &Predicate) -> Result<Vec<Map<String, Value>>, DomainError>;

    async fn fetch_one(&self, model: &Model, predicate: &Predicate) -> Result<Option<Map<String, Value>>, DomainError>;

    /// Inserts a row and returns it as stored (with its generated id).
    async fn insert(&self, model: &Model, payload: &Map<String, Value>) -> Result<Map<String, Value>, DomainError>;

    /// Overwrites the row whose id is `payload[id]`. `NoRowsUpdated` when there is none.
    async fn replace(&self, model: &Model, payload: &Map<String, Value>) -> Result<Map<String, Value>, DomainError>;

    /// Deletes the matching rows. `NoRowsDeleted` when there are none.
    async fn delete_one(&self, model: &Model, predicate: &Predicate) -> Result<(), DomainError>;

    /// Deletes every matching row. Must refuse an empty predicate.
    async fn delete_all(&self, model: &Model, predicate: &Predicate) -> Result<(), DomainError>;
}

pub(crate) fn empty_predicate_error() -> DomainError {
    DomainError::storage(
        "EmptyPredicateException",
        "delete all requires an explicit predicate",
    )
}
