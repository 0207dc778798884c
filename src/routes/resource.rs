//! Resource routes built from the registry.
//! Every resource mounts its collection path, its item path (`<basePath>/{id}`) and its custom
//! operations; handlers find the resource and parameter names in request extensions.

use crate::config::{route_path, ResolvedResource};
use crate::handlers::resource::{
    create, custom, delete as delete_handler, delete_all, list, read, replace, CustomRoute, PathParams,
};
use crate::state::AppState;
use axum::{
    routing::{get, on},
    Extension, Router,
};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

pub fn resource_routes(state: AppState) -> Router {
    let mut router = Router::new();
    for resource in state.registry.resources() {
        router = router.merge(mount(resource));
    }
    router
        .layer(RequestBodyLimitLayer::new(state.service.options().max_body_bytes))
        .with_state(state)
}

fn mount(resource: &Arc<ResolvedResource>) -> Router<AppState> {
    let collection = resource.base_path.clone();
    let item = resource.item_template();
    let mut router = Router::new()
        .route(
            &route_path(&collection),
            get(list)
                .post(create)
                .delete(delete_all)
                .layer(Extension(PathParams::of(&collection))),
        )
        .route(
            &route_path(&item),
            get(read)
                .put(replace)
                .delete(delete_handler)
                .layer(Extension(PathParams::of(&item))),
        );
    for op in &resource.custom {
        let template = resource.custom_template(op);
        let route = CustomRoute {
            op: op.clone(),
            params: PathParams::of(&template),
        };
        router = router.route(&route_path(&template), on(op.method, custom).layer(Extension(route)));
    }
    router.layer(Extension(resource.clone()))
}
