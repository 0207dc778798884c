//! Request validation from field constraints.
//!
//! Every constrained field is checked (no early exit), unknown fields pass through untouched and
//! the returned payload carries converted values and schema defaults.

use crate::schema::{Constraint, FieldType};
use crate::service::normalize::{parse_date, to_rfc3339};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Where a violation points: the whole payload or one of its fields.
#[derive(Clone, Debug, PartialEq)]
pub enum ViolationPath {
    Root,
    Field(String),
}

/// One failed constraint.
#[derive(Clone, Debug, PartialEq)]
pub struct Violation {
    pub path: ViolationPath,
    /// Stable symbolic identifier, e.g. "string.regex.base".
    pub kind: &'static str,
    pub value: Option<Value>,
    /// Auxiliary values of the failed rule. Includes the `key` bookkeeping entry.
    pub context: Map<String, Value>,
}

impl Violation {
    fn field(key: &str, kind: &'static str, value: Option<&Value>) -> Self {
        let mut context = Map::new();
        context.insert("key".into(), Value::String(key.to_string()));
        if let Some(v) = value {
            context.insert("value".into(), v.clone());
        }
        Violation {
            path: ViolationPath::Field(key.to_string()),
            kind,
            value: value.cloned(),
            context,
        }
    }

    fn with(mut self, name: &str, value: Value) -> Self {
        self.context.insert(name.to_string(), value);
        self
    }

    fn root(value: Option<&Value>) -> Self {
        let mut context = Map::new();
        if let Some(v) = value {
            context.insert("value".into(), v.clone());
        }
        Violation {
            path: ViolationPath::Root,
            kind: "object.base",
            value: value.cloned(),
            context,
        }
    }
}

pub struct RequestValidator;

impl RequestValidator {
    /// Validate `payload` against `constraints`. Returns the payload with conversions and defaults
    /// applied, or every violation found.
    pub fn validate(
        payload: Option<&Value>,
        constraints: &BTreeMap<&str, &Constraint>,
    ) -> Result<Map<String, Value>, Vec<Violation>> {
        let body = match payload {
            Some(Value::Object(m)) => m,
            other => return Err(vec![Violation::root(other)]),
        };
        let mut out = body.clone();
        let mut violations = Vec::new();
        for (key, rule) in constraints {
            match body.get(*key) {
                None => {
                    if rule.required {
                        violations.push(Violation::field(key, "any.required", None));
                    } else if let Some(default) = &rule.default {
                        out.insert(key.to_string(), default.clone());
                    }
                }
                Some(v) => match validate_field(key, v, rule) {
                    Ok(converted) => {
                        out.insert(key.to_string(), converted);
                    }
                    Err(mut found) => violations.append(&mut found),
                },
            }
        }
        if violations.is_empty() {
            Ok(out)
        } else {
            Err(violations)
        }
    }
}

fn validate_field(key: &str, v: &Value, rule: &Constraint) -> Result<Value, Vec<Violation>> {
    if v.is_null() {
        if rule.nullable || rule.field_type == FieldType::Any {
            return Ok(Value::Null);
        }
        return Err(vec![base_violation(key, v, rule.field_type)]);
    }
    let converted = convert(v, rule).ok_or_else(|| vec![base_violation(key, v, rule.field_type)])?;

    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(&converted, a)) {
            return Err(vec![Violation::field(key, "any.allowOnly", Some(v))
                .with("valids", Value::Array(allowed.clone()))]);
        }
    }

    let mut violations = Vec::new();
    match &converted {
        Value::String(s) if rule.field_type == FieldType::String => {
            let len = s.chars().count();
            if let Some(min) = rule.min_length {
                if len < min {
                    violations.push(Violation::field(key, "string.min", Some(v)).with("limit", min.into()));
                }
            }
            if let Some(max) = rule.max_length {
                if len > max {
                    violations.push(Violation::field(key, "string.max", Some(v)).with("limit", max.into()));
                }
            }
            if let Some(re) = &rule.pattern {
                if !re.is_match(s) {
                    violations.push(
                        Violation::field(key, "string.regex.base", Some(v))
                            .with("pattern", Value::String(format!("/{}/", re.as_str()))),
                    );
                }
            }
        }
        Value::Number(n) => {
            let f = n.as_f64().unwrap_or(0.0);
            if rule.integer && f.fract() != 0.0 {
                violations.push(Violation::field(key, "number.integer", Some(v)));
            }
            if rule.positive && f <= 0.0 {
                violations.push(Violation::field(key, "number.positive", Some(v)));
            }
            if let Some(min) = rule.minimum {
                if f < min {
                    violations.push(Violation::field(key, "number.min", Some(v)).with("limit", json_f64(min)));
                }
            }
            if let Some(max) = rule.maximum {
                if f > max {
                    violations.push(Violation::field(key, "number.max", Some(v)).with("limit", json_f64(max)));
                }
            }
        }
        _ => {}
    }
    if violations.is_empty() {
        Ok(converted)
    } else {
        Err(violations)
    }
}

fn base_violation(key: &str, v: &Value, field_type: FieldType) -> Violation {
    let kind = match field_type {
        FieldType::Any => "any.base",
        FieldType::String => "string.base",
        FieldType::Number => "number.base",
        FieldType::Date => "date.base",
        FieldType::Boolean => "boolean.base",
    };
    Violation::field(key, kind, Some(v))
}

/// Type check with the usual lenient conversions; `None` when the value has the wrong type.
pub(crate) fn convert(v: &Value, rule: &Constraint) -> Option<Value> {
    match rule.field_type {
        FieldType::Any => Some(v.clone()),
        FieldType::String => v.as_str().map(|_| v.clone()),
        FieldType::Number => match v {
            Value::Number(_) => Some(v.clone()),
            Value::String(s) => parse_number(s.trim()),
            _ => None,
        },
        FieldType::Date => {
            parse_date(v, rule.date_format.as_deref()).map(|d| Value::String(to_rfc3339(&d)))
        }
        FieldType::Boolean => match v {
            Value::Bool(_) => Some(v.clone()),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Some(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Some(Value::Bool(false)),
            _ => None,
        },
    }
}

fn parse_number(s: &str) -> Option<Value> {
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn json_f64(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number((n as i64).into())
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

pub(crate) fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        _ => a == b,
    }
}
