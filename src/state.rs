//! Shared application state for all routes.

use crate::config::Registry;
use crate::service::CrudService;
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: CrudService,
    /// Frozen once routes are built.
    pub registry: Arc<Registry>,
}

impl AppState {
    pub fn new(registry: Registry, store: Arc<dyn Store>) -> Self {
        let service = CrudService::new(store, registry.options().clone());
        AppState {
            service,
            registry: Arc::new(registry),
        }
    }
}
