//! Resource CRUD: declarative resource descriptions turned into validated, scoped REST operations.

pub mod case;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod schema;
pub mod scope;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod testutils;

pub use config::{
    load_declarations_from_path, parse_declarations, CustomOperation, Operation, OperationHandler, Options,
    Registry, ResolvedResource, ResourceConfig, ResourceDeclaration,
};
pub use error::{ConfigError, DomainError, Rejection};
pub use response::Reply;
pub use routes::{common_routes, resource_routes};
pub use schema::{Constraint, FieldSpec, FieldType};
pub use scope::{RequestContext, Scope};
pub use service::CrudService;
pub use state::AppState;
pub use store::{MemoryStore, Model, PgStore, Predicate, Store};
