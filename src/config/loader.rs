//! Build resources from declarations and resolve them for runtime use.

use crate::case::to_snake_case;
use crate::config::resolved::ResolvedResource;
use crate::config::types::*;
use crate::error::ConfigError;
use crate::schema::{derive_required_scope_fields, fields_of_type, FieldMap, FieldType};
use crate::scope::Scope;
use crate::store::Model;
use std::path::Path;

/// Build the runtime form of `config` (call after validate).
pub fn resolve(config: ResourceConfig, options: &Options) -> ResolvedResource {
    let ResourceConfig {
        mut model,
        base_path,
        mut fields,
        scope,
        after_create,
        after_update,
        mut operations,
        custom,
    } = config;

    let scope_keys = match &scope {
        Some(scope) => {
            derive_required_scope_fields(&mut fields, scope);
            scope.keys()
        }
        None => Vec::new(),
    };
    for (column, pg_type) in column_casts(&fields) {
        model.casts.entry(column).or_insert(pg_type);
    }
    if !options.allow_delete_all {
        operations.remove(&Operation::DeleteAll);
    }

    ResolvedResource {
        model,
        base_path,
        fields,
        scope,
        scope_keys,
        after_create,
        after_update,
        operations,
        custom,
    }
}

/// SQL casts for fields whose values travel as strings.
fn column_casts(fields: &FieldMap) -> Vec<(String, String)> {
    fields_of_type(fields, FieldType::Date)
        .map(|name| (to_snake_case(name), "timestamptz".to_string()))
        .collect()
}

impl TryFrom<ResourceDeclaration> for ResourceConfig {
    type Error = ConfigError;

    fn try_from(decl: ResourceDeclaration) -> Result<Self, Self::Error> {
        if decl.table.trim().is_empty() {
            return Err(ConfigError::Declaration(format!(
                "resource {} has no table",
                decl.base_path
            )));
        }
        let mut model = Model::new(decl.table);
        if let Some(schema) = decl.schema {
            model = model.in_schema(schema);
        }
        let mut config = ResourceConfig::new(model, decl.base_path);
        for (name, field) in &decl.fields {
            config.fields.insert(name.clone(), field.to_spec(name)?);
        }
        if !decl.scope_params.is_empty() {
            config.scope = Some(Scope::from_params(decl.scope_params));
        }
        if let Some(ops) = decl.operations {
            config.operations = ops.into_iter().collect();
        }
        Ok(config)
    }
}

/// Parse a JSON array of resource declarations.
pub fn parse_declarations(content: &str) -> Result<Vec<ResourceConfig>, ConfigError> {
    let decls: Vec<ResourceDeclaration> =
        serde_json::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))?;
    decls.into_iter().map(ResourceConfig::try_from).collect()
}

/// Load resource declarations from a JSON file.
pub async fn load_declarations_from_path(path: impl AsRef<Path>) -> Result<Vec<ResourceConfig>, ConfigError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let configs = parse_declarations(&content)?;
    tracing::debug!(path = %path.display(), resources = configs.len(), "declarations loaded");
    Ok(configs)
}
