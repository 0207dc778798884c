//! Fixtures shared by router and service tests: a customers resource and its nested payments,
//! mounted over a `MemoryStore`.

use crate::config::{Options, Registry, ResourceConfig};
use crate::routes::resource_routes;
use crate::schema::Constraint;
use crate::scope::Scope;
use crate::state::AppState;
use crate::store::{MemoryStore, Model};
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub fn customers() -> ResourceConfig {
    ResourceConfig::new(Model::new("customer"), "/customers")
        .field(
            "name",
            Constraint::string().pattern(Regex::new("^[A-Za-z ]*$").unwrap()),
        )
        .field("occupation", Constraint::string().default_value(json!("Unemployed")))
        .field("birthDate", Constraint::date().allow_null())
        .omit("payments")
}

pub fn payments() -> ResourceConfig {
    ResourceConfig::new(Model::new("payment"), "/customers/{customerId}/payments")
        .field("customerId", Constraint::number().integer())
        .field("amount", Constraint::number().positive())
        .field("date", Constraint::date())
        .scope(Scope::from_params(["customerId"]))
}

pub fn registry(options: Options) -> Registry {
    let mut registry = Registry::new(options);
    registry.register(customers()).unwrap();
    registry.register(payments()).unwrap();
    registry
}

/// Router over a fresh store, plus a handle to that store.
pub fn app_with(registry: Registry) -> (Router, MemoryStore) {
    let store = MemoryStore::new();
    let state = AppState::new(registry, Arc::new(store.clone()));
    (resource_routes(state), store)
}

pub fn app() -> (Router, MemoryStore) {
    app_with(registry(Options::default()))
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Parsed JSON body; `None` when the body was empty or not JSON.
    pub body: Option<Value>,
    pub text: String,
}

pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> TestResponse {
    let body = match body {
        Some(v) => Body::from(v.to_string()),
        None => Body::empty(),
    };
    send_raw(app, method, uri, body).await
}

pub async fn send_raw(app: &Router, method: &str, uri: &str, body: Body) -> TestResponse {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).ok();
    let text = String::from_utf8_lossy(&bytes).into_owned();
    TestResponse {
        status,
        headers,
        body,
        text,
    }
}
