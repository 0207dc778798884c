//! Request context and scope resolution for nested resources.
//!
//! A scope derives, from the request, the values that constrain every operation on a resource
//! (typically the parent ids embedded in the path, e.g. `/customers/{customerId}/payments`).

use crate::case::keys_to_snake_case;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Everything the engine knows about one inbound call. Built per request, dropped afterwards.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    /// Path parameters by name, as captured by the router.
    pub params: HashMap<String, String>,
    /// Query string parameters.
    pub query: HashMap<String, String>,
    /// Parsed JSON body; `None` when the request had none.
    pub payload: Option<Value>,
    /// Scheme and host the request was addressed to, e.g. "http://localhost:3000".
    pub base_url: String,
}

impl RequestContext {
    /// Neutral context used to enumerate the keys a scope produces.
    pub fn probe() -> Self {
        RequestContext {
            payload: Some(Value::Object(Map::new())),
            ..Default::default()
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Path parameter as a JSON string, or `null` when missing.
    pub fn param_value(&self, name: &str) -> Value {
        self.param(name)
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null)
    }
}

type ScopeFn = dyn Fn(&RequestContext) -> Map<String, Value> + Send + Sync;

/// Derives the scope predicate (attribute name -> value) of a request.
///
/// Scope functions must tolerate a context without params: registration probes them with
/// [`RequestContext::probe`] to learn their keys.
#[derive(Clone)]
pub struct Scope(Arc<ScopeFn>);

impl Scope {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&RequestContext) -> Map<String, Value> + Send + Sync + 'static,
    {
        Scope(Arc::new(f))
    }

    /// Scope made of path parameters copied verbatim, the common nested-resource case.
    pub fn from_params<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        Scope::new(move |ctx| {
            names
                .iter()
                .map(|n| (n.clone(), ctx.param_value(n)))
                .collect()
        })
    }

    pub fn derive(&self, ctx: &RequestContext) -> Map<String, Value> {
        (self.0)(ctx)
    }

    /// Keys the scope produces, learned by probing it with a neutral context.
    pub fn keys(&self) -> Vec<String> {
        self.derive(&RequestContext::probe()).keys().cloned().collect()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Scope").field(&self.keys()).finish()
    }
}

/// Converts a path id to a JSON value: integers when the segment is one, strings otherwise.
pub fn parse_path_id(id: &str) -> Value {
    match id.parse::<i64>() {
        Ok(n) => Value::Number(n.into()),
        Err(_) => Value::String(id.to_string()),
    }
}

/// WHERE map for "find all": the scope translated to column names, or empty.
pub fn list_predicate(ctx: &RequestContext, scope: Option<&Scope>) -> Map<String, Value> {
    match scope {
        Some(scope) => keys_to_snake_case(&scope.derive(ctx)),
        None => Map::new(),
    }
}

/// WHERE map for "find by id": the list predicate plus the path id.
pub fn item_predicate(ctx: &RequestContext, scope: Option<&Scope>) -> Map<String, Value> {
    let mut predicate = list_predicate(ctx, scope);
    let id = ctx.param("id").map(parse_path_id).unwrap_or(Value::Null);
    predicate.insert("id".to_string(), id);
    predicate
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(params: &[(&str, &str)]) -> RequestContext {
        RequestContext {
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    fn customer_scope() -> Scope {
        Scope::new(|ctx| {
            let mut m = Map::new();
            m.insert("customerId".into(), ctx.param_value("customerId"));
            m
        })
    }

    #[test]
    fn test_list_predicate() {
        let ctx = context(&[("customerId", "myCustomerId"), ("otherId", "myOtherId")]);
        let predicate = list_predicate(&ctx, Some(&customer_scope()));
        assert_eq!(json!({"customer_id": "myCustomerId"}), Value::Object(predicate));
    }

    #[test]
    fn test_list_predicate_without_scope() {
        let ctx = context(&[("customerId", "myCustomerId")]);
        assert!(list_predicate(&ctx, None).is_empty());
    }

    #[test]
    fn test_item_predicate() {
        let ctx = context(&[("id", "myId"), ("customerId", "myCustomerId"), ("otherId", "myOtherId")]);
        let predicate = item_predicate(&ctx, Some(&customer_scope()));
        assert_eq!(
            json!({"id": "myId", "customer_id": "myCustomerId"}),
            Value::Object(predicate)
        );
    }

    #[test]
    fn test_item_predicate_numeric_id() {
        let ctx = context(&[("id", "7")]);
        assert_eq!(json!({"id": 7}), Value::Object(item_predicate(&ctx, None)));
    }

    #[test]
    fn test_predicates_are_deterministic() {
        let ctx = context(&[("id", "1"), ("customerId", "C1")]);
        let scope = customer_scope();
        assert_eq!(item_predicate(&ctx, Some(&scope)), item_predicate(&ctx, Some(&scope)));
    }

    #[test]
    fn test_scope_from_params_keys() {
        let scope = Scope::from_params(["customerId", "purchaseId"]);
        let mut keys = scope.keys();
        keys.sort();
        assert_eq!(vec!["customerId", "purchaseId"], keys);

        let ctx = context(&[("customerId", "C1")]);
        assert_eq!(
            json!({"customerId": "C1", "purchaseId": null}),
            Value::Object(scope.derive(&ctx))
        );
    }
}
