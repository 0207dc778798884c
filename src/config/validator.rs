//! Registration checks: path templates, duplicate routes, scope keys.

use crate::config::{CustomOperation, ResolvedResource, ResourceConfig};
use crate::error::ConfigError;
use crate::schema::{is_valid_date_format, FieldSpec};
use axum::routing::MethodFilter;
use std::sync::Arc;

/// Parameter names of a path template, in order. `None` when the template is malformed
/// (unbalanced braces, empty or non-identifier names, braces inside a literal segment).
pub fn template_params(template: &str) -> Option<Vec<String>> {
    let mut names = Vec::new();
    for segment in template.split('/').skip(1) {
        match segment_param(segment) {
            Some(name) => {
                let valid = !name.is_empty()
                    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                if !valid {
                    return None;
                }
                names.push(name.to_string());
            }
            None if segment.contains(['{', '}', ':', '*']) => return None,
            None => {}
        }
    }
    Some(names)
}

/// Rewrites a `{name}` template into router syntax. Parameters are named by segment position
/// (`:p2`) so that templates sharing a prefix never disagree on a parameter name.
pub fn route_path(template: &str) -> String {
    template
        .split('/')
        .enumerate()
        .map(|(i, segment)| match segment_param(segment) {
            Some(_) => format!(":p{}", i),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Router parameter name -> template parameter name, for every parameter of `template`.
pub fn param_bindings(template: &str) -> Vec<(String, String)> {
    template
        .split('/')
        .enumerate()
        .filter_map(|(i, segment)| segment_param(segment).map(|name| (format!("p{}", i), name.to_string())))
        .collect()
}

fn segment_param(segment: &str) -> Option<&str> {
    segment.strip_prefix('{').and_then(|s| s.strip_suffix('}'))
}

fn check_base_path(base_path: &str) -> Result<Vec<String>, ConfigError> {
    let invalid = || ConfigError::InvalidBasePath(base_path.to_string());
    if !base_path.starts_with('/') || base_path.len() < 2 || base_path.ends_with('/') || base_path.contains("//") {
        return Err(invalid());
    }
    let params = template_params(base_path).ok_or_else(invalid)?;
    if params.iter().any(|p| p == "id") {
        return Err(invalid());
    }
    Ok(params)
}

fn check_custom_path(base_path: &str, path: &str) -> Result<(), ConfigError> {
    if path.is_empty() {
        return Ok(());
    }
    let full = format!("{}{}", base_path, path);
    if !path.starts_with('/') || path.ends_with('/') || full.contains("//") || template_params(&full).is_none() {
        return Err(ConfigError::Declaration(format!(
            "custom operation path '{}' of {} is not a valid path template",
            path, base_path
        )));
    }
    Ok(())
}

/// Router path and method of every route a resource mounts: collection, item, then custom.
/// Combined method filters only compare equal to the same combination.
fn mounted_routes(base_path: &str, custom: &[CustomOperation]) -> Vec<(String, MethodFilter)> {
    let collection = route_path(base_path);
    let item = route_path(&format!("{}/{{id}}", base_path));
    let mut routes = vec![
        (collection.clone(), MethodFilter::GET),
        (collection.clone(), MethodFilter::POST),
        (collection, MethodFilter::DELETE),
        (item.clone(), MethodFilter::GET),
        (item.clone(), MethodFilter::PUT),
        (item, MethodFilter::DELETE),
    ];
    for op in custom {
        routes.push((route_path(&format!("{}{}", base_path, op.path)), op.method));
    }
    routes
}

fn check_routes(config: &ResourceConfig, registered: &[Arc<ResolvedResource>]) -> Result<(), ConfigError> {
    let routes = mounted_routes(&config.base_path, &config.custom);
    for (i, (path, method)) in routes.iter().enumerate() {
        if routes[..i].iter().any(|(p, m)| p == path && m == method) {
            return Err(ConfigError::Declaration(format!(
                "custom operation {:?} {} of {} is already mounted",
                method, path, config.base_path
            )));
        }
    }
    for resource in registered {
        let taken = mounted_routes(&resource.base_path, &resource.custom);
        if routes.iter().any(|route| taken.contains(route)) {
            return Err(ConfigError::DuplicateBasePath(config.base_path.clone()));
        }
    }
    Ok(())
}

fn check_date_formats(config: &ResourceConfig) -> Result<(), ConfigError> {
    for (field, spec) in &config.fields {
        let Some(format) = spec.constraint().and_then(|c| c.date_format.as_deref()) else {
            continue;
        };
        if !is_valid_date_format(format) {
            return Err(ConfigError::InvalidDateFormat {
                field: field.clone(),
                format: format.to_string(),
            });
        }
    }
    Ok(())
}

/// Validates a resource against itself and the resources registered before it.
pub fn validate(config: &ResourceConfig, registered: &[Arc<ResolvedResource>]) -> Result<(), ConfigError> {
    check_base_path(&config.base_path)?;
    for op in &config.custom {
        check_custom_path(&config.base_path, &op.path)?;
    }
    check_routes(config, registered)?;
    check_date_formats(config)?;

    if let Some(scope) = &config.scope {
        for key in scope.keys() {
            if key == "id" {
                return Err(ConfigError::ReservedScopeKey(config.base_path.clone()));
            }
            if let Some(FieldSpec::Omitted) = config.fields.get(&key) {
                return Err(ConfigError::OmittedScopeKey {
                    base_path: config.base_path.clone(),
                    key,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;
    use crate::store::Model;

    #[test]
    fn test_template_params() {
        assert_eq!(Some(vec![]), template_params("/customers"));
        assert_eq!(
            Some(vec!["customerId".to_string()]),
            template_params("/customers/{customerId}/payments")
        );
        assert_eq!(None, template_params("/customers/{}/payments"));
        assert_eq!(None, template_params("/customers/{customerId/payments"));
        assert_eq!(None, template_params("/customers/:customerId"));
    }

    #[test]
    fn test_route_path() {
        assert_eq!("/customers/:p2/payments", route_path("/customers/{customerId}/payments"));
        assert_eq!("/customers/:p2", route_path("/customers/{id}"));
        assert_eq!("/customers", route_path("/customers"));
    }

    #[test]
    fn test_param_bindings() {
        assert_eq!(
            vec![
                ("p2".to_string(), "customerId".to_string()),
                ("p4".to_string(), "id".to_string()),
            ],
            param_bindings("/customers/{customerId}/payments/{id}")
        );
        assert!(param_bindings("/customers").is_empty());
    }

    #[test]
    fn test_rejects_invalid_base_paths() {
        for path in ["customers", "/", "/customers/", "/a//b", "/customers/{id}/payments"] {
            let config = ResourceConfig::new(Model::new("customer"), path);
            assert!(
                matches!(validate(&config, &[]), Err(ConfigError::InvalidBasePath(_))),
                "{} should be rejected",
                path
            );
        }
    }

    #[test]
    fn test_rejects_omitted_scope_key() {
        let config = ResourceConfig::new(Model::new("payment"), "/customers/{customerId}/payments")
            .omit("customerId")
            .scope(Scope::from_params(["customerId"]));
        assert!(matches!(
            validate(&config, &[]),
            Err(ConfigError::OmittedScopeKey { key, .. }) if key == "customerId"
        ));
    }

    #[test]
    fn test_rejects_id_scope_key() {
        let config = ResourceConfig::new(Model::new("payment"), "/payments")
            .scope(Scope::from_params(["id"]));
        assert!(matches!(validate(&config, &[]), Err(ConfigError::ReservedScopeKey(_))));
    }

    struct Noop;

    #[async_trait::async_trait]
    impl crate::config::OperationHandler for Noop {
        async fn handle(
            &self,
            _: &ResolvedResource,
            _: &crate::scope::RequestContext,
            _: &dyn crate::store::Store,
        ) -> Result<crate::response::Reply, crate::error::Rejection> {
            Ok(crate::response::Reply::NoContent)
        }
    }

    #[test]
    fn test_rejects_routes_mounted_by_another_resource() {
        let mut registry = crate::config::Registry::default();
        registry
            .register(
                ResourceConfig::new(Model::new("customer"), "/customers")
                    .custom(CustomOperation::new(MethodFilter::GET, "/summary", Noop)),
            )
            .unwrap();

        let item_clash = ResourceConfig::new(Model::new("account"), "/customers/{customerId}");
        assert!(matches!(
            registry.register(item_clash),
            Err(ConfigError::DuplicateBasePath(path)) if path == "/customers/{customerId}"
        ));
        let collection_clash = ResourceConfig::new(Model::new("client"), "/customers");
        assert!(matches!(registry.register(collection_clash), Err(ConfigError::DuplicateBasePath(_))));

        let custom_clash = ResourceConfig::new(Model::new("summary"), "/customers/summary");
        assert!(matches!(registry.register(custom_clash), Err(ConfigError::DuplicateBasePath(_))));

        registry
            .register(ResourceConfig::new(Model::new("payment"), "/customers/{customerId}/payments"))
            .unwrap();
        assert_eq!(2, registry.resources().len());
    }

    #[test]
    fn test_rejects_custom_operation_over_standard_route() {
        let config = ResourceConfig::new(Model::new("customer"), "/customers")
            .custom(CustomOperation::new(MethodFilter::GET, "/{id}", Noop));
        assert!(matches!(validate(&config, &[]), Err(ConfigError::Declaration(_))));

        let config = ResourceConfig::new(Model::new("customer"), "/customers")
            .custom(CustomOperation::new(MethodFilter::PATCH, "/{id}", Noop))
            .custom(CustomOperation::new(MethodFilter::POST, "/{id}/archive", Noop));
        assert!(validate(&config, &[]).is_ok());
    }

    #[test]
    fn test_rejects_unrenderable_date_format() {
        use crate::schema::Constraint;

        let config = ResourceConfig::new(Model::new("event"), "/events")
            .field("at", Constraint::date().format("%Q"));
        assert!(matches!(
            validate(&config, &[]),
            Err(ConfigError::InvalidDateFormat { field, format }) if field == "at" && format == "%Q"
        ));

        let config = ResourceConfig::new(Model::new("event"), "/events")
            .field("at", Constraint::date().format("%d/%m/%Y %H:%M"));
        assert!(validate(&config, &[]).is_ok());
    }

    #[test]
    fn test_rejects_invalid_custom_path() {
        let config = ResourceConfig::new(Model::new("customer"), "/customers")
            .custom(CustomOperation::new(MethodFilter::POST, "archive", Noop));
        assert!(matches!(validate(&config, &[]), Err(ConfigError::Declaration(_))));
    }
}
