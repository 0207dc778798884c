//! Registration inputs: engine options, the in-code resource builder, and the JSON declaration
//! types it can also be built from.

use crate::error::{ConfigError, Rejection};
use crate::response::Reply;
use crate::schema::{is_valid_date_format, Constraint, FieldMap, FieldSpec, FieldType};
use crate::scope::{RequestContext, Scope};
use crate::store::{Model, Store};
use crate::config::ResolvedResource;
use async_trait::async_trait;
use axum::routing::MethodFilter;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Engine-wide switches, fixed at registration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Include `{"error": {...}}` in 400 responses for guard and storage failures.
    pub return_exception_body: bool,
    /// Expose `DELETE <basePath>`; when false it answers 403.
    pub allow_delete_all: bool,
    /// Turn extra query parameters naming a declared field into equality filters on list.
    pub allow_filters: bool,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            return_exception_body: true,
            allow_delete_all: true,
            allow_filters: true,
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl Options {
    /// Defaults overridden by `CRUD_RETURN_EXCEPTION_BODY`, `CRUD_ALLOW_DELETE_ALL`,
    /// `CRUD_ALLOW_FILTERS` and `CRUD_MAX_BODY_BYTES`. Unparseable values keep the default.
    pub fn from_env() -> Self {
        let defaults = Options::default();
        Options {
            return_exception_body: env_parse("CRUD_RETURN_EXCEPTION_BODY")
                .unwrap_or(defaults.return_exception_body),
            allow_delete_all: env_parse("CRUD_ALLOW_DELETE_ALL").unwrap_or(defaults.allow_delete_all),
            allow_filters: env_parse("CRUD_ALLOW_FILTERS").unwrap_or(defaults.allow_filters),
            max_body_bytes: env_parse("CRUD_MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparseable option");
            None
        }
    }
}

/// The standard operations generated for every resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    List,
    Get,
    Create,
    Replace,
    Delete,
    DeleteAll,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::List,
        Operation::Get,
        Operation::Create,
        Operation::Replace,
        Operation::Delete,
        Operation::DeleteAll,
    ];
}

pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Called with the serialized entity after a successful create or replace.
pub type Hook = Arc<dyn Fn(&Map<String, Value>) -> Result<(), HookError> + Send + Sync>;

/// Body of an ad hoc operation. Receives the context with its payload already normalized and,
/// when requested, validated.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(
        &self,
        resource: &ResolvedResource,
        ctx: &RequestContext,
        store: &dyn Store,
    ) -> Result<Reply, Rejection>;
}

/// An extra endpoint mounted under a resource's base path.
#[derive(Clone)]
pub struct CustomOperation {
    pub method: MethodFilter,
    /// Appended to the base path, e.g. "/{id}/archive". Empty for the base path itself.
    pub path: String,
    pub validate: bool,
    pub allowed: bool,
    pub handler: Arc<dyn OperationHandler>,
}

impl CustomOperation {
    pub fn new(method: MethodFilter, path: impl Into<String>, handler: impl OperationHandler + 'static) -> Self {
        CustomOperation {
            method,
            path: path.into(),
            validate: true,
            allowed: true,
            handler: Arc::new(handler),
        }
    }

    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub fn disallowed(mut self) -> Self {
        self.allowed = false;
        self
    }
}

impl fmt::Debug for CustomOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomOperation")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("validate", &self.validate)
            .field("allowed", &self.allowed)
            .finish()
    }
}

/// Description of a resource before registration.
pub struct ResourceConfig {
    pub model: Model,
    /// Path template with `{name}` parameters, e.g. "/customers/{customerId}/payments".
    pub base_path: String,
    pub fields: FieldMap,
    pub scope: Option<Scope>,
    pub after_create: Option<Hook>,
    pub after_update: Option<Hook>,
    pub operations: HashSet<Operation>,
    pub custom: Vec<CustomOperation>,
}

impl fmt::Debug for ResourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceConfig")
            .field("model", &self.model)
            .field("base_path", &self.base_path)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("operations", &self.operations)
            .field("custom", &self.custom)
            .finish()
    }
}

impl ResourceConfig {
    pub fn new(model: Model, base_path: impl Into<String>) -> Self {
        ResourceConfig {
            model,
            base_path: base_path.into(),
            fields: FieldMap::new(),
            scope: None,
            after_create: None,
            after_update: None,
            operations: Operation::ALL.into_iter().collect(),
            custom: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, constraint: Constraint) -> Self {
        self.fields.insert(name.into(), FieldSpec::Validated(constraint));
        self
    }

    pub fn omit(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), FieldSpec::Omitted);
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn after_create<F>(mut self, f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.after_create = Some(Arc::new(f));
        self
    }

    pub fn after_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.after_update = Some(Arc::new(f));
        self
    }

    pub fn disable(mut self, op: Operation) -> Self {
        self.operations.remove(&op);
        self
    }

    pub fn custom(mut self, op: CustomOperation) -> Self {
        self.custom.push(op);
        self
    }
}

/// JSON form of a resource, e.g.
/// `{"table": "payment", "basePath": "/customers/{customerId}/payments", "scopeParams": ["customerId"],
///   "fields": {"amount": {"type": "number", "positive": true}}}`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDeclaration {
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub base_path: String,
    /// Path parameters that scope the resource.
    #[serde(default)]
    pub scope_params: Vec<String>,
    /// Enabled operations; all of them when absent.
    #[serde(default)]
    pub operations: Option<Vec<Operation>>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDeclaration>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldDeclaration {
    Omitted,
    Any(RuleDeclaration),
    String(RuleDeclaration),
    Number(RuleDeclaration),
    Date(RuleDeclaration),
    Boolean(RuleDeclaration),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuleDeclaration {
    pub required: bool,
    pub allow_null: bool,
    pub default: Option<Value>,
    pub pattern: Option<String>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub positive: bool,
    pub integer: bool,
    pub allowed: Option<Vec<Value>>,
    pub format: Option<String>,
}

impl FieldDeclaration {
    pub fn to_spec(&self, field: &str) -> Result<FieldSpec, ConfigError> {
        let (field_type, rules) = match self {
            FieldDeclaration::Omitted => return Ok(FieldSpec::Omitted),
            FieldDeclaration::Any(r) => (FieldType::Any, r),
            FieldDeclaration::String(r) => (FieldType::String, r),
            FieldDeclaration::Number(r) => (FieldType::Number, r),
            FieldDeclaration::Date(r) => (FieldType::Date, r),
            FieldDeclaration::Boolean(r) => (FieldType::Boolean, r),
        };
        let pattern = match &rules.pattern {
            Some(p) => Some(Regex::new(p).map_err(|source| ConfigError::InvalidPattern {
                field: field.to_string(),
                source,
            })?),
            None => None,
        };
        if let Some(format) = rules.format.as_deref().filter(|f| !is_valid_date_format(f)) {
            return Err(ConfigError::InvalidDateFormat {
                field: field.to_string(),
                format: format.to_string(),
            });
        }
        Ok(FieldSpec::Validated(Constraint {
            field_type,
            required: rules.required,
            nullable: rules.allow_null,
            default: rules.default.clone(),
            pattern,
            min_length: rules.min_length,
            max_length: rules.max_length,
            minimum: rules.minimum,
            maximum: rules.maximum,
            positive: rules.positive,
            integer: rules.integer,
            allowed: rules.allowed.clone(),
            date_format: rules.format.clone(),
        }))
    }
}
