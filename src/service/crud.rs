//! The request pipeline of a resource: permission check, payload normalization, guard, validation,
//! store dispatch, serialization and hooks. Every path ends in exactly one response.

use crate::case::{keys_to_snake_case, to_snake_case};
use crate::config::{CustomOperation, Hook, Operation, Options, ResolvedResource};
use crate::error::{DomainError, Rejection};
use crate::response::{from_domain_error, from_violations, Reply};
use crate::schema::FieldSpec;
use crate::scope::{item_predicate, list_predicate, parse_path_id, RequestContext};
use crate::service::normalize::{normalize_payload, serialize_entity};
use crate::service::validation::{convert, value_eq, RequestValidator};
use crate::store::{Predicate, Store};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

#[derive(Clone)]
pub struct CrudService {
    store: Arc<dyn Store>,
    options: Options,
}

impl CrudService {
    pub fn new(store: Arc<dyn Store>, options: Options) -> Self {
        CrudService { store, options }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Run a standard operation and render its outcome.
    pub async fn handle(&self, resource: &ResolvedResource, op: Operation, mut ctx: RequestContext) -> Response {
        tracing::debug!(base_path = %resource.base_path, operation = ?op, params = ?ctx.params, "request");
        let outcome = match op {
            Operation::List => self.list(resource, &ctx).await,
            Operation::Get => self.get(resource, &ctx).await,
            Operation::Create => self.create(resource, &mut ctx).await,
            Operation::Replace => self.replace(resource, &mut ctx).await,
            Operation::Delete => self.delete(resource, &ctx).await,
            Operation::DeleteAll => self.delete_all(resource, &ctx).await,
        };
        self.respond(outcome)
    }

    /// Run a custom operation and render its outcome.
    pub async fn handle_custom(
        &self,
        resource: &ResolvedResource,
        op: &CustomOperation,
        mut ctx: RequestContext,
    ) -> Response {
        tracing::debug!(base_path = %resource.base_path, path = %op.path, params = ?ctx.params, "custom request");
        let outcome = self.custom(resource, op, &mut ctx).await;
        self.respond(outcome)
    }

    /// Turn an outcome into the HTTP response.
    pub fn respond(&self, outcome: Result<Reply, Rejection>) -> Response {
        match outcome {
            Ok(reply) => reply.into_response(),
            Err(Rejection::Forbidden) => StatusCode::FORBIDDEN.into_response(),
            Err(Rejection::NotFound) => StatusCode::NOT_FOUND.into_response(),
            Err(Rejection::Domain(err)) if self.options.return_exception_body => {
                (StatusCode::BAD_REQUEST, Json(from_domain_error(&err))).into_response()
            }
            Err(Rejection::Domain(_)) => StatusCode::BAD_REQUEST.into_response(),
            Err(Rejection::Invalid(violations)) => {
                tracing::debug!(violations = violations.len(), "payload rejected");
                (StatusCode::BAD_REQUEST, Json(from_violations(&violations))).into_response()
            }
        }
    }

    pub async fn list(&self, resource: &ResolvedResource, ctx: &RequestContext) -> Result<Reply, Rejection> {
        permit(resource, Operation::List)?;
        let predicate = self.list_filter(resource, ctx);
        let rows = self
            .store
            .fetch_all(&resource.model, &predicate)
            .await
            .map_err(|e| storage_failure(resource, Operation::List, e))?;
        Ok(Reply::Collection(
            rows.iter()
                .map(|row| Value::Object(serialize_entity(row, &resource.fields)))
                .collect(),
        ))
    }

    pub async fn get(&self, resource: &ResolvedResource, ctx: &RequestContext) -> Result<Reply, Rejection> {
        permit(resource, Operation::Get)?;
        let predicate = Predicate::from_map(&item_predicate(ctx, resource.scope.as_ref()));
        let row = self
            .store
            .fetch_one(&resource.model, &predicate)
            .await
            .map_err(|e| storage_failure(resource, Operation::Get, e))?
            .ok_or(Rejection::NotFound)?;
        Ok(Reply::Entity(Value::Object(serialize_entity(&row, &resource.fields))))
    }

    pub async fn create(&self, resource: &ResolvedResource, ctx: &mut RequestContext) -> Result<Reply, Rejection> {
        permit(resource, Operation::Create)?;
        let payload = prepare(resource, ctx, guard_create)?;
        let row = self
            .store
            .insert(&resource.model, &keys_to_snake_case(&payload))
            .await
            .map_err(|e| storage_failure(resource, Operation::Create, e))?;
        let entity = serialize_entity(&row, &resource.fields);
        run_hook(resource, "after_create", resource.after_create.as_ref(), &entity);
        Ok(located(resource, ctx, StatusCode::CREATED, entity))
    }

    pub async fn replace(&self, resource: &ResolvedResource, ctx: &mut RequestContext) -> Result<Reply, Rejection> {
        permit(resource, Operation::Replace)?;
        let payload = prepare(resource, ctx, guard_replace)?;
        let row = self
            .store
            .replace(&resource.model, &keys_to_snake_case(&payload))
            .await
            .map_err(|e| storage_failure(resource, Operation::Replace, e))?;
        let entity = serialize_entity(&row, &resource.fields);
        run_hook(resource, "after_update", resource.after_update.as_ref(), &entity);
        Ok(located(resource, ctx, StatusCode::OK, entity))
    }

    pub async fn delete(&self, resource: &ResolvedResource, ctx: &RequestContext) -> Result<Reply, Rejection> {
        permit(resource, Operation::Delete)?;
        let predicate = Predicate::from_map(&item_predicate(ctx, resource.scope.as_ref()));
        self.store
            .delete_one(&resource.model, &predicate)
            .await
            .map_err(|e| storage_failure(resource, Operation::Delete, e))?;
        Ok(Reply::NoContent)
    }

    /// Deletes every row in scope. The `id <> 0` term keeps the predicate non-empty for
    /// unscoped resources.
    pub async fn delete_all(&self, resource: &ResolvedResource, ctx: &RequestContext) -> Result<Reply, Rejection> {
        permit(resource, Operation::DeleteAll)?;
        let predicate = Predicate::from_map(&list_predicate(ctx, resource.scope.as_ref())).not_eq("id", json!(0));
        self.store
            .delete_all(&resource.model, &predicate)
            .await
            .map_err(|e| storage_failure(resource, Operation::DeleteAll, e))?;
        Ok(Reply::NoContent)
    }

    /// Normalizes the payload, validates it when the operation asks for it and a body is present,
    /// then hands over to the operation's handler.
    pub async fn custom(
        &self,
        resource: &ResolvedResource,
        op: &CustomOperation,
        ctx: &mut RequestContext,
    ) -> Result<Reply, Rejection> {
        if !op.allowed {
            return Err(Rejection::Forbidden);
        }
        if let Some(Value::Object(payload)) = ctx.payload.as_mut() {
            normalize_payload(payload, &ctx.params, &resource.scope_keys, &resource.fields);
        }
        if op.validate && ctx.payload.is_some() {
            let validated = RequestValidator::validate(ctx.payload.as_ref(), &resource.constraints())
                .map_err(Rejection::Invalid)?;
            ctx.payload = Some(Value::Object(validated));
        }
        op.handler
            .handle(resource, ctx, self.store.as_ref())
            .await
            .map_err(|rejection| match rejection {
                Rejection::Domain(err) => {
                    tracing::error!(
                        base_path = %resource.base_path,
                        path = %op.path,
                        exception = %err.kind(),
                        error = %err,
                        "custom operation failed"
                    );
                    Rejection::Domain(err)
                }
                other => other,
            })
    }

    /// Scope predicate plus, when enabled, equality filters from query parameters that name a
    /// declared field or the id. Scope terms cannot be overridden.
    fn list_filter(&self, resource: &ResolvedResource, ctx: &RequestContext) -> Predicate {
        let mut terms = list_predicate(ctx, resource.scope.as_ref());
        if self.options.allow_filters {
            let query: BTreeMap<&String, &String> = ctx.query.iter().collect();
            for (name, raw) in query {
                let column = to_snake_case(name);
                if terms.contains_key(&column) {
                    continue;
                }
                let value = if name == "id" {
                    parse_path_id(raw)
                } else {
                    match resource.fields.get(name.as_str()).and_then(FieldSpec::constraint) {
                        Some(c) => {
                            let raw = Value::String(raw.clone());
                            convert(&raw, c).unwrap_or(raw)
                        }
                        None => continue,
                    }
                };
                terms.insert(column, value);
            }
        }
        Predicate::from_map(&terms)
    }
}

fn permit(resource: &ResolvedResource, op: Operation) -> Result<(), Rejection> {
    if resource.allows(op) {
        Ok(())
    } else {
        Err(Rejection::Forbidden)
    }
}

/// Normalize, guard, then validate the payload. Returns the validated payload (attribute names).
fn prepare<G>(resource: &ResolvedResource, ctx: &mut RequestContext, guard: G) -> Result<Map<String, Value>, Rejection>
where
    G: FnOnce(&mut Map<String, Value>, &HashMap<String, String>) -> Result<(), DomainError>,
{
    if let Some(Value::Object(payload)) = ctx.payload.as_mut() {
        normalize_payload(payload, &ctx.params, &resource.scope_keys, &resource.fields);
        guard(payload, &ctx.params)?;
    }
    RequestValidator::validate(ctx.payload.as_ref(), &resource.constraints()).map_err(Rejection::Invalid)
}

fn guard_create(payload: &mut Map<String, Value>, _params: &HashMap<String, String>) -> Result<(), DomainError> {
    match payload.get("id") {
        Some(id) if !id.is_null() => Err(DomainError::BodyIdIsNotNull),
        _ => Ok(()),
    }
}

/// The body id may be absent or equal to the path id; either way the path id wins.
fn guard_replace(payload: &mut Map<String, Value>, params: &HashMap<String, String>) -> Result<(), DomainError> {
    let path_id = params
        .get("id")
        .map(|id| parse_path_id(id))
        .unwrap_or(Value::Null);
    if let Some(id) = payload.get("id") {
        if !id.is_null() && !value_eq(id, &path_id) {
            return Err(DomainError::BodyIdDoesNotMatchPath);
        }
    }
    payload.insert("id".to_string(), path_id);
    Ok(())
}

fn located(resource: &ResolvedResource, ctx: &RequestContext, status: StatusCode, entity: Map<String, Value>) -> Reply {
    let id = entity.get("id").cloned().unwrap_or(Value::Null);
    Reply::Located {
        status,
        location: resource.location(ctx, &id),
        entity: Value::Object(entity),
    }
}

fn storage_failure(resource: &ResolvedResource, op: Operation, err: DomainError) -> Rejection {
    tracing::error!(
        base_path = %resource.base_path,
        operation = ?op,
        exception = %err.kind(),
        error = %err,
        "store operation failed"
    );
    Rejection::Domain(err)
}

/// Hooks observe the outcome; their failures are logged and never change the response.
fn run_hook(resource: &ResolvedResource, name: &'static str, hook: Option<&Hook>, entity: &Map<String, Value>) {
    let Some(hook) = hook else { return };
    match std::panic::catch_unwind(AssertUnwindSafe(|| hook(entity))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!(base_path = %resource.base_path, hook = name, error = %err, "hook failed"),
        Err(_) => tracing::warn!(base_path = %resource.base_path, hook = name, "hook panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Registry, ResourceConfig};
    use crate::schema::Constraint;
    use crate::scope::Scope;
    use crate::store::{Condition, MemoryStore, Model, StoreCall};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service(store: &MemoryStore) -> CrudService {
        CrudService::new(Arc::new(store.clone()), Options::default())
    }

    fn payments(registry: &mut Registry) -> Arc<ResolvedResource> {
        registry
            .register(
                ResourceConfig::new(Model::new("payment"), "/customers/{customerId}/payments")
                    .field("amount", Constraint::number())
                    .scope(Scope::from_params(["customerId"])),
            )
            .unwrap()
    }

    fn context(params: &[(&str, &str)], payload: Option<Value>) -> RequestContext {
        RequestContext {
            params: params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            payload,
            base_url: "http://localhost".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_injects_scope_and_dispatches_snake_case() {
        let store = MemoryStore::new();
        let mut registry = Registry::default();
        let resource = payments(&mut registry);

        let mut ctx = context(
            &[("customerId", "myCustomerId")],
            Some(json!({"customerId": "client-supplied", "amount": 10})),
        );
        let reply = service(&store).create(&resource, &mut ctx).await.unwrap();

        let expected: Map<String, Value> = json!({"customer_id": "myCustomerId", "amount": 10})
            .as_object()
            .unwrap()
            .clone();
        assert_eq!(vec![StoreCall::Insert("payment".into(), expected)], store.calls());
        assert_eq!(
            Reply::Located {
                status: StatusCode::CREATED,
                entity: json!({"id": 1, "customerId": "myCustomerId", "amount": 10}),
                location: "http://localhost/customers/myCustomerId/payments/1".into(),
            },
            reply
        );
    }

    #[tokio::test]
    async fn test_create_rejects_body_id() {
        let store = MemoryStore::new();
        let mut registry = Registry::default();
        let resource = payments(&mut registry);

        let mut ctx = context(&[("customerId", "C1")], Some(json!({"id": 4, "amount": 1})));
        let err = service(&store).create(&resource, &mut ctx).await.unwrap_err();
        assert!(matches!(err, Rejection::Domain(DomainError::BodyIdIsNotNull)));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_replace_guard() {
        let store = MemoryStore::new();
        let mut registry = Registry::default();
        let resource = payments(&mut registry);
        let service = service(&store);

        let mut mismatch = context(&[("customerId", "C1"), ("id", "1")], Some(json!({"id": 2})));
        let err = service.replace(&resource, &mut mismatch).await.unwrap_err();
        assert!(matches!(err, Rejection::Domain(DomainError::BodyIdDoesNotMatchPath)));

        let mut missing = context(&[("customerId", "C1"), ("id", "1")], Some(json!({"amount": 3})));
        let err = service.replace(&resource, &mut missing).await.unwrap_err();
        assert!(matches!(err, Rejection::Domain(DomainError::NoRowsUpdated)));
        let expected: Map<String, Value> = json!({"id": 1, "customer_id": "C1", "amount": 3})
            .as_object()
            .unwrap()
            .clone();
        assert_eq!(vec![StoreCall::Replace("payment".into(), expected)], store.calls());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let mut registry = Registry::default();
        let resource = payments(&mut registry);

        let err = service(&store)
            .get(&resource, &context(&[("customerId", "C1"), ("id", "9")], None))
            .await
            .unwrap_err();
        assert!(matches!(err, Rejection::NotFound));
    }

    #[tokio::test]
    async fn test_delete_all_scoped_with_guard_term() {
        let store = MemoryStore::new();
        let mut registry = Registry::default();
        let resource = payments(&mut registry);

        service(&store)
            .delete_all(&resource, &context(&[("customerId", "C1")], None))
            .await
            .unwrap();
        let expected = Predicate {
            conditions: vec![
                Condition::Eq("customer_id".into(), json!("C1")),
                Condition::NotEq("id".into(), json!(0)),
            ],
        };
        assert_eq!(vec![StoreCall::DeleteAll("payment".into(), expected)], store.calls());
    }

    #[tokio::test]
    async fn test_list_filters_cannot_override_scope() {
        let store = MemoryStore::new();
        let mut registry = Registry::default();
        let resource = payments(&mut registry);

        let mut ctx = context(&[("customerId", "C1")], None);
        ctx.query = [("customerId", "C2"), ("amount", "10"), ("unknown", "x")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        service(&store).list(&resource, &ctx).await.unwrap();
        let expected = Predicate {
            conditions: vec![
                Condition::Eq("amount".into(), json!(10)),
                Condition::Eq("customer_id".into(), json!("C1")),
            ],
        };
        assert_eq!(vec![StoreCall::FetchAll("payment".into(), expected)], store.calls());
    }

    #[tokio::test]
    async fn test_list_ignores_query_when_filters_disabled() {
        let store = MemoryStore::new();
        let mut registry = Registry::default();
        let resource = payments(&mut registry);
        let service = CrudService::new(
            Arc::new(store.clone()),
            Options {
                allow_filters: false,
                ..Options::default()
            },
        );

        let mut ctx = context(&[("customerId", "C1")], None);
        ctx.query.insert("amount".into(), "10".into());
        service.list(&resource, &ctx).await.unwrap();
        let expected = Predicate::new().eq("customer_id", json!("C1"));
        assert_eq!(vec![StoreCall::FetchAll("payment".into(), expected)], store.calls());
    }

    #[tokio::test]
    async fn test_hook_failures_do_not_change_outcome() {
        let store = MemoryStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut registry = Registry::default();
        let resource = registry
            .register(
                ResourceConfig::new(Model::new("customer"), "/customers")
                    .field("name", Constraint::string())
                    .after_create(move |_| {
                        seen.fetch_add(1, Ordering::SeqCst);
                        Err("mail server down".into())
                    })
                    .after_update(|_| panic!("boom")),
            )
            .unwrap();
        let service = service(&store);

        let mut create = context(&[], Some(json!({"name": "Jane"})));
        assert!(service.create(&resource, &mut create).await.is_ok());
        assert_eq!(1, calls.load(Ordering::SeqCst));

        let mut replace = context(&[("id", "1")], Some(json!({"name": "June"})));
        assert!(service.replace(&resource, &mut replace).await.is_ok());
    }

    #[tokio::test]
    async fn test_storage_failure_is_domain_rejection() {
        let store = MemoryStore::new();
        store.set_failure(Some(DomainError::storage("23503", "fk violation")));
        let mut registry = Registry::default();
        let resource = payments(&mut registry);

        let err = service(&store)
            .delete(&resource, &context(&[("customerId", "C1"), ("id", "1")], None))
            .await
            .unwrap_err();
        assert!(matches!(err, Rejection::Domain(ref e) if e.kind() == "23503"));
    }
}
