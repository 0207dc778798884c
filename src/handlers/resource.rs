//! Resource handlers: one per standard operation plus the custom-operation entry point.
//!
//! Each route carries its resource and its parameter bindings as request extensions.

use crate::config::{param_bindings, CustomOperation, Operation, ResolvedResource};
use crate::scope::RequestContext;
use crate::state::AppState;
use axum::{
    extract::State,
    response::Response,
    Extension,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps the router's positional parameter names back to the names of the route's template.
#[derive(Clone, Debug)]
pub struct PathParams(Arc<Vec<(String, String)>>);

impl PathParams {
    pub fn of(template: &str) -> Self {
        PathParams(Arc::new(param_bindings(template)))
    }

    pub fn bind(&self, raw: HashMap<String, String>) -> HashMap<String, String> {
        let mut raw = raw;
        let mut bound = HashMap::with_capacity(raw.len());
        for (positional, name) in self.0.iter() {
            if let Some(v) = raw.remove(positional) {
                bound.insert(name.clone(), v);
            }
        }
        bound.extend(raw);
        bound
    }
}

/// Extension attached to a custom operation's route.
#[derive(Clone, Debug)]
pub struct CustomRoute {
    pub op: CustomOperation,
    pub params: PathParams,
}

async fn dispatch(
    state: AppState,
    resource: Arc<ResolvedResource>,
    params: PathParams,
    op: Operation,
    mut ctx: RequestContext,
) -> Response {
    ctx.params = params.bind(std::mem::take(&mut ctx.params));
    state.service.handle(&resource, op, ctx).await
}

pub async fn list(
    State(state): State<AppState>,
    Extension(resource): Extension<Arc<ResolvedResource>>,
    Extension(params): Extension<PathParams>,
    ctx: RequestContext,
) -> Response {
    dispatch(state, resource, params, Operation::List, ctx).await
}

pub async fn create(
    State(state): State<AppState>,
    Extension(resource): Extension<Arc<ResolvedResource>>,
    Extension(params): Extension<PathParams>,
    ctx: RequestContext,
) -> Response {
    dispatch(state, resource, params, Operation::Create, ctx).await
}

pub async fn delete_all(
    State(state): State<AppState>,
    Extension(resource): Extension<Arc<ResolvedResource>>,
    Extension(params): Extension<PathParams>,
    ctx: RequestContext,
) -> Response {
    dispatch(state, resource, params, Operation::DeleteAll, ctx).await
}

pub async fn read(
    State(state): State<AppState>,
    Extension(resource): Extension<Arc<ResolvedResource>>,
    Extension(params): Extension<PathParams>,
    ctx: RequestContext,
) -> Response {
    dispatch(state, resource, params, Operation::Get, ctx).await
}

pub async fn replace(
    State(state): State<AppState>,
    Extension(resource): Extension<Arc<ResolvedResource>>,
    Extension(params): Extension<PathParams>,
    ctx: RequestContext,
) -> Response {
    dispatch(state, resource, params, Operation::Replace, ctx).await
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(resource): Extension<Arc<ResolvedResource>>,
    Extension(params): Extension<PathParams>,
    ctx: RequestContext,
) -> Response {
    dispatch(state, resource, params, Operation::Delete, ctx).await
}

pub async fn custom(
    State(state): State<AppState>,
    Extension(resource): Extension<Arc<ResolvedResource>>,
    Extension(route): Extension<CustomRoute>,
    mut ctx: RequestContext,
) -> Response {
    ctx.params = route.params.bind(std::mem::take(&mut ctx.params));
    state.service.handle_custom(&resource, &route.op, ctx).await
}
