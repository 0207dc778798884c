//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from a model handle and a predicate.

use crate::sql::params::PgBindValue;
use crate::store::{Condition, Model, Predicate};
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL. Identifiers come from registration or from validated payload
/// keys; quoting keeps either from breaking out of the statement.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
fn qualified_table(model: &Model) -> String {
    match &model.schema {
        Some(schema) => format!("{}.{}", quoted(schema), quoted(&model.table)),
        None => quoted(&model.table),
    }
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: PgBindValue) -> u32 {
        self.params.push(v);
        self.params.len() as u32
    }

    /// Placeholder for a value written into `column`: `$n`, cast when the model declares a type,
    /// or the NULL literal.
    fn value_placeholder(&mut self, model: &Model, column: &str, v: &Value) -> String {
        let Some(bind) = PgBindValue::from_json(v) else {
            return "NULL".to_string();
        };
        let n = self.push_param(bind);
        match model.casts.get(column) {
            Some(t) => format!("${}::{}", n, t),
            None => format!("${}", n),
        }
    }

    /// One WHERE term. Text values compare against the column's text form so that path segments
    /// match integer and uuid columns alike.
    fn condition(&mut self, model: &Model, cond: &Condition) -> String {
        let (column, v, op) = match cond {
            Condition::Eq(c, v) => (c, v, "="),
            Condition::NotEq(c, v) => (c, v, "<>"),
        };
        let Some(bind) = PgBindValue::from_json(v) else {
            return match cond {
                Condition::Eq(..) => format!("{} IS NULL", quoted(column)),
                Condition::NotEq(..) => format!("{} IS NOT NULL", quoted(column)),
            };
        };
        let text = bind.is_text();
        let n = self.push_param(bind);
        match model.casts.get(column.as_str()) {
            Some(t) => format!("{} {} ${}::{}", quoted(column), op, n, t),
            None if text => format!("{}::text {} ${}", quoted(column), op, n),
            None => format!("{} {} ${}", quoted(column), op, n),
        }
    }

    fn where_clause(&mut self, model: &Model, predicate: &Predicate) -> String {
        if predicate.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = predicate
            .conditions
            .iter()
            .map(|c| self.condition(model, c))
            .collect();
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// SELECT every column of the matching rows, ORDER BY id.
pub fn select_where(model: &Model, predicate: &Predicate) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = q.where_clause(model, predicate);
    q.sql = format!(
        "SELECT * FROM {}{} ORDER BY {}",
        qualified_table(model),
        where_clause,
        quoted(&model.id_column)
    );
    q
}

/// INSERT the payload's columns. A null id is left out so the column default applies.
pub fn insert(model: &Model, payload: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(model);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for (name, v) in payload {
        if *name == model.id_column && v.is_null() {
            continue;
        }
        cols.push(quoted(name));
        placeholders.push(q.value_placeholder(model, name, v));
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            table,
            cols.join(", "),
            placeholders.join(", ")
        )
    };
    q
}

/// UPDATE by id: SET every payload column except the id.
pub fn update_by_id(model: &Model, payload: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(model);
    let mut sets = Vec::new();
    for (name, v) in payload {
        if *name == model.id_column {
            continue;
        }
        let rhs = q.value_placeholder(model, name, v);
        sets.push(format!("{} = {}", quoted(name), rhs));
    }
    let id = payload.get(&model.id_column).cloned().unwrap_or(Value::Null);
    let by_id = Predicate::new().eq(model.id_column.clone(), id);
    if sets.is_empty() {
        let where_clause = q.where_clause(model, &by_id);
        q.sql = format!("SELECT * FROM {}{}", table, where_clause);
        return q;
    }
    let where_clause = q.where_clause(model, &by_id);
    q.sql = format!(
        "UPDATE {} SET {}{} RETURNING *",
        table,
        sets.join(", "),
        where_clause
    );
    q
}

/// DELETE the matching rows.
pub fn delete_where(model: &Model, predicate: &Predicate) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = q.where_clause(model, predicate);
    q.sql = format!("DELETE FROM {}{}", qualified_table(model), where_clause);
    q
}
