//! Response bodies: error shapes for domain failures and violations, and success replies.

use crate::error::DomainError;
use crate::service::validation::{Violation, ViolationPath};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Serialize, Debug, PartialEq)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub exception: String,
    pub detail_message: String,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorBody {
    pub validation_errors: BTreeMap<String, ViolationDetail>,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViolationDetail {
    pub attributes: BTreeMap<String, String>,
    pub constraint_class_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_value: Option<Value>,
    pub message_template: String,
}

/// `{"error": {"exception": kind, "detailMessage": message}}`
pub fn from_domain_error(err: &DomainError) -> ErrorBody {
    ErrorBody {
        error: ErrorDetail {
            exception: err.kind().to_string(),
            detail_message: err.to_string(),
        },
    }
}

/// `{"validationErrors": {path: {...}}}`, keyed by field path, or "." for the whole payload.
///
/// One entry per path: the first violation reported for a field is kept. `invalidValue` is present
/// whenever the payload carried the key, `null` included.
pub fn from_violations(violations: &[Violation]) -> ValidationErrorBody {
    let mut validation_errors = BTreeMap::new();
    for v in violations {
        let key = match &v.path {
            ViolationPath::Root => ".".to_string(),
            ViolationPath::Field(name) => name.clone(),
        };
        validation_errors.entry(key).or_insert_with(|| ViolationDetail {
            attributes: attributes(&v.context),
            constraint_class_name: v.kind.to_string(),
            invalid_value: v.value.clone(),
            message_template: v.kind.to_string(),
        });
    }
    ValidationErrorBody { validation_errors }
}

/// Stringified context values, without the `key` entry and without nulls.
fn attributes(context: &Map<String, Value>) -> BTreeMap<String, String> {
    context
        .iter()
        .filter(|(k, v)| k.as_str() != "key" && !v.is_null())
        .map(|(k, v)| (k.clone(), stringify(v)))
        .collect()
}

fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Successful outcome of an operation, before it becomes an HTTP response.
#[derive(Debug, PartialEq)]
pub enum Reply {
    Collection(Vec<Value>),
    Entity(Value),
    /// Entity plus the URL it lives at.
    Located {
        status: StatusCode,
        entity: Value,
        location: String,
    },
    NoContent,
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Collection(items) => (StatusCode::OK, Json(Value::Array(items))).into_response(),
            Reply::Entity(entity) => (StatusCode::OK, Json(entity)).into_response(),
            Reply::Located {
                status,
                entity,
                location,
            } => {
                let mut response = (status, Json(entity)).into_response();
                if let Ok(v) = HeaderValue::from_str(&location) {
                    response.headers_mut().insert(header::LOCATION, v);
                }
                response
            }
            Reply::NoContent => StatusCode::NO_CONTENT.into_response(),
        }
    }
}
