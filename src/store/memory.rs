//! Store backed by in-memory tables, for tests and demos.

use super::{empty_predicate_error, Model, Predicate, Store};
use crate::error::DomainError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// A call received by a [`MemoryStore`], as recorded for inspection.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreCall {
    FetchAll(String, Predicate),
    FetchOne(String, Predicate),
    Insert(String, Map<String, Value>),
    Replace(String, Map<String, Value>),
    DeleteOne(String, Predicate),
    DeleteAll(String, Predicate),
}

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Map<String, Value>>>,
    next_id: HashMap<String, i64>,
    calls: Vec<StoreCall>,
    failure: Option<DomainError>,
}

/// Store that keeps rows per table in memory. Ids are assigned from a per-table sequence
/// starting at 1.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock cannot leave the tables half-written.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes every following call fail with `err` until cleared with `None`.
    pub fn set_failure(&self, err: Option<DomainError>) {
        self.lock().failure = err;
    }

    /// Every call received so far, oldest first.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Current rows of `table`.
    pub fn rows(&self, table: &str) -> Vec<Map<String, Value>> {
        self.lock().rows.get(table).cloned().unwrap_or_default()
    }

    fn begin(&self, call: StoreCall) -> Result<MutexGuard<'_, Tables>, DomainError> {
        let mut tables = self.lock();
        tables.calls.push(call);
        if let Some(err) = tables.failure.clone() {
            return Err(err);
        }
        Ok(tables)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_all(&self, model: &Model, predicate: &Predicate) -> Result<Vec<Map<String, Value>>, DomainError> {
        let tables = self.begin(StoreCall::FetchAll(model.table.clone(), predicate.clone()))?;
        let rows = tables.rows.get(&model.table).map(Vec::as_slice).unwrap_or(&[]);
        Ok(rows.iter().filter(|r| predicate.matches(r)).cloned().collect())
    }

    async fn fetch_one(&self, model: &Model, predicate: &Predicate) -> Result<Option<Map<String, Value>>, DomainError> {
        let tables = self.begin(StoreCall::FetchOne(model.table.clone(), predicate.clone()))?;
        let rows = tables.rows.get(&model.table).map(Vec::as_slice).unwrap_or(&[]);
        Ok(rows.iter().find(|r| predicate.matches(r)).cloned())
    }

    async fn insert(&self, model: &Model, payload: &Map<String, Value>) -> Result<Map<String, Value>, DomainError> {
        let mut tables = self.begin(StoreCall::Insert(model.table.clone(), payload.clone()))?;
        let mut row = payload.clone();
        let has_id = row.get(&model.id_column).map(|v| !v.is_null()).unwrap_or(false);
        if !has_id {
            let next = tables.next_id.entry(model.table.clone()).or_insert(0);
            *next += 1;
            row.insert(model.id_column.clone(), Value::Number((*next).into()));
        }
        tables.rows.entry(model.table.clone()).or_default().push(row.clone());
        Ok(row)
    }

    async fn replace(&self, model: &Model, payload: &Map<String, Value>) -> Result<Map<String, Value>, DomainError> {
        let mut tables = self.begin(StoreCall::Replace(model.table.clone(), payload.clone()))?;
        let id = payload.get(&model.id_column).cloned().unwrap_or(Value::Null);
        let by_id = Predicate::new().eq(model.id_column.clone(), id);
        let rows = tables.rows.entry(model.table.clone()).or_default();
        let row = rows
            .iter_mut()
            .find(|r| by_id.matches(r))
            .ok_or(DomainError::NoRowsUpdated)?;
        *row = payload.clone();
        Ok(row.clone())
    }

    async fn delete_one(&self, model: &Model, predicate: &Predicate) -> Result<(), DomainError> {
        let mut tables = self.begin(StoreCall::DeleteOne(model.table.clone(), predicate.clone()))?;
        let rows = tables.rows.entry(model.table.clone()).or_default();
        let before = rows.len();
        rows.retain(|r| !predicate.matches(r));
        if rows.len() == before {
            return Err(DomainError::NoRowsDeleted);
        }
        Ok(())
    }

    async fn delete_all(&self, model: &Model, predicate: &Predicate) -> Result<(), DomainError> {
        let mut tables = self.begin(StoreCall::DeleteAll(model.table.clone(), predicate.clone()))?;
        if predicate.is_empty() {
            return Err(empty_predicate_error());
        }
        if let Some(rows) = tables.rows.get_mut(&model.table) {
            rows.retain(|r| !predicate.matches(r));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_fetches() {
        let store = MemoryStore::new();
        let model = Model::new("customer");

        let first = store.insert(&model, &row(json!({"name": "A"}))).await.unwrap();
        let second = store.insert(&model, &row(json!({"name": "B"}))).await.unwrap();
        assert_eq!(json!(1), first["id"]);
        assert_eq!(json!(2), second["id"]);

        let all = store.fetch_all(&model, &Predicate::new()).await.unwrap();
        assert_eq!(2, all.len());
        let one = store
            .fetch_one(&model, &Predicate::new().eq("id", json!(2)))
            .await
            .unwrap();
        assert_eq!(Some(second), one);
    }

    #[tokio::test]
    async fn test_replace_and_delete_report_missing_rows() {
        let store = MemoryStore::new();
        let model = Model::new("customer");
        store.insert(&model, &row(json!({"name": "A"}))).await.unwrap();

        let replaced = store.replace(&model, &row(json!({"id": 1, "name": "Z"}))).await.unwrap();
        assert_eq!(json!("Z"), replaced["name"]);
        assert_eq!(
            DomainError::NoRowsUpdated,
            store.replace(&model, &row(json!({"id": 9}))).await.unwrap_err()
        );

        let by_id = |id: i64| Predicate::new().eq("id", json!(id));
        assert_eq!(DomainError::NoRowsDeleted, store.delete_one(&model, &by_id(9)).await.unwrap_err());
        store.delete_one(&model, &by_id(1)).await.unwrap();
        assert!(store.rows("customer").is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_refuses_empty_predicate() {
        let store = MemoryStore::new();
        let model = Model::new("payment");
        store.insert(&model, &row(json!({"customer_id": 1}))).await.unwrap();
        store.insert(&model, &row(json!({"customer_id": 2}))).await.unwrap();

        let err = store.delete_all(&model, &Predicate::new()).await.unwrap_err();
        assert_eq!("EmptyPredicateException", err.kind());

        let predicate = Predicate::new().eq("customer_id", json!(1)).not_eq("id", json!(0));
        store.delete_all(&model, &predicate).await.unwrap();
        assert_eq!(1, store.rows("payment").len());
    }

    #[tokio::test]
    async fn test_failure_injection_and_call_log() {
        let store = MemoryStore::new();
        let model = Model::new("customer");
        store.set_failure(Some(DomainError::storage("23503", "fk")));
        let err = store.fetch_all(&model, &Predicate::new()).await.unwrap_err();
        assert_eq!("23503", err.kind());
        assert_eq!(vec![StoreCall::FetchAll("customer".into(), Predicate::new())], store.calls());
    }
}
