//! Common routes: health, version, registered resources.

use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceSummary {
    base_path: String,
    table: String,
    scope_keys: Vec<String>,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn resources(State(state): State<AppState>) -> Json<Vec<ResourceSummary>> {
    Json(
        state
            .registry
            .resources()
            .iter()
            .map(|r| ResourceSummary {
                base_path: r.base_path.clone(),
                table: r.model.table.clone(),
                scope_keys: r.scope_keys.clone(),
            })
            .collect(),
    )
}

/// GET /health, GET /version, GET /resources.
pub fn common_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/resources", get(resources))
        .with_state(state)
}
