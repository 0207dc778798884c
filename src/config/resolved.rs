//! Resolved resources: configs validated and flattened for runtime use.

use crate::config::{resolve, validate, CustomOperation, Hook, Operation, Options, ResourceConfig};
use crate::config::validator::route_path;
use crate::error::ConfigError;
use crate::schema::{extract_validatable_constraints, Constraint, FieldMap};
use crate::scope::{RequestContext, Scope};
use crate::store::Model;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A registered resource. Immutable once built; shared by every route it mounts.
pub struct ResolvedResource {
    pub model: Model,
    pub base_path: String,
    /// Constraint map with scope keys already made required.
    pub fields: FieldMap,
    pub scope: Option<Scope>,
    /// Keys the scope derives, learned once at registration.
    pub scope_keys: Vec<String>,
    pub after_create: Option<Hook>,
    pub after_update: Option<Hook>,
    /// Enabled standard operations. DeleteAll is absent when the engine disallows it.
    pub operations: HashSet<Operation>,
    pub custom: Vec<CustomOperation>,
}

impl ResolvedResource {
    pub fn allows(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    pub fn constraints(&self) -> BTreeMap<&str, &Constraint> {
        extract_validatable_constraints(&self.fields)
    }

    /// Collection path in router syntax, e.g. "/customers/:p2/payments".
    pub fn route_path(&self) -> String {
        route_path(&self.base_path)
    }

    /// Template of the single-entity path.
    pub fn item_template(&self) -> String {
        format!("{}/{{id}}", self.base_path)
    }

    /// Template of a custom operation's path.
    pub fn custom_template(&self, op: &CustomOperation) -> String {
        format!("{}{}", self.base_path, op.path)
    }

    /// Absolute URL of the entity `id` as seen by the caller of `ctx`.
    pub fn location(&self, ctx: &RequestContext, id: &Value) -> String {
        let path = self
            .base_path
            .split('/')
            .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => ctx.param(name).unwrap_or_default().to_string(),
                None => segment.to_string(),
            })
            .collect::<Vec<_>>()
            .join("/");
        let id = match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        format!("{}{}/{}", ctx.base_url, path, id)
    }
}

impl fmt::Debug for ResolvedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedResource")
            .field("table", &self.model.table)
            .field("base_path", &self.base_path)
            .field("scope_keys", &self.scope_keys)
            .field("operations", &self.operations)
            .field("custom", &self.custom)
            .finish()
    }
}

/// Every resource registered with the engine, in registration order.
#[derive(Debug, Default)]
pub struct Registry {
    options: Options,
    resources: Vec<Arc<ResolvedResource>>,
}

impl Registry {
    pub fn new(options: Options) -> Self {
        Registry {
            options,
            resources: Vec::new(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn resources(&self) -> &[Arc<ResolvedResource>] {
        &self.resources
    }

    /// Validates and resolves `config`. Fails without side effects.
    pub fn register(&mut self, config: ResourceConfig) -> Result<Arc<ResolvedResource>, ConfigError> {
        validate(&config, &self.resources)?;
        let resource = Arc::new(resolve(config, &self.options));
        tracing::info!(
            base_path = %resource.base_path,
            table = %resource.model.table,
            scope_keys = ?resource.scope_keys,
            custom_operations = resource.custom.len(),
            "resource registered"
        );
        self.resources.push(resource.clone());
        Ok(resource)
    }
}
