//! Demo server: customers and their payments over PostgreSQL.
//!
//! Run from repo root: `cargo run -p demo-server`
//! Set `RESOURCES_FILE` to serve JSON-declared resources instead of the built-in ones.

use regex::Regex;
use resource_crud::{
    common_routes, load_declarations_from_path, resource_routes, AppState, Constraint, Model, Options, PgStore,
    Registry, ResourceConfig, Scope,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS customer (
    id BIGSERIAL PRIMARY KEY,
    name TEXT,
    occupation TEXT,
    birth_date TIMESTAMPTZ
);
CREATE TABLE IF NOT EXISTS payment (
    id BIGSERIAL PRIMARY KEY,
    customer_id BIGINT NOT NULL REFERENCES customer (id),
    amount DOUBLE PRECISION NOT NULL,
    date TIMESTAMPTZ NOT NULL
);
"#;

fn builtin_resources() -> Result<Vec<ResourceConfig>, Box<dyn std::error::Error>> {
    let customers = ResourceConfig::new(Model::new("customer"), "/customers")
        .field("name", Constraint::string().pattern(Regex::new("^[A-Za-z ]*$")?))
        .field("occupation", Constraint::string().default_value(json!("Unemployed")))
        .field("birthDate", Constraint::date().allow_null().format("%Y-%m-%d"))
        .omit("payments")
        .after_create(|customer| {
            tracing::info!(id = ?customer.get("id"), "customer created");
            Ok(())
        });
    let payments = ResourceConfig::new(Model::new("payment"), "/customers/{customerId}/payments")
        .field("customerId", Constraint::number().integer())
        .field("amount", Constraint::number().positive())
        .field("date", Constraint::date())
        .scope(Scope::from_params(["customerId"]));
    Ok(vec![customers, payments])
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("resource_crud=info,demo_server=info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/resource_crud".into());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;

    let configs = match std::env::var("RESOURCES_FILE") {
        Ok(path) => load_declarations_from_path(path).await?,
        Err(_) => builtin_resources()?,
    };
    let mut registry = Registry::new(Options::from_env());
    for config in configs {
        registry.register(config)?;
    }
    let state = AppState::new(registry, Arc::new(PgStore::new(pool)));

    let app = common_routes(state.clone()).merge(resource_routes(state));
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("demo server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
