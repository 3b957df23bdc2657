//! API Routes
//!
//! Configures the Axum router: introspection endpoints, one route set per
//! resource and the 404 fallback.

use std::sync::Arc;

use axum::{
    routing::{get, patch},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    create_handler, destroy_handler, fallback_handler, get_handler, health_handler, list_handler,
    root_handler, soft_delete_handler, stats_handler, update_handler, AppState, ResourceState,
};
use crate::crud::ResourceController;
use crate::engine::Resource;
use crate::error::ErrorMapper;

/// Prefix shared by every resource route
pub const API_PREFIX: &str = "/api/v1";

/// Routes for one resource.
///
/// # Endpoints
/// - `GET /api/v1/<resource>` - List with paging, sorting and filters
/// - `POST /api/v1/<resource>` - Create
/// - `GET /api/v1/<resource>/:id` - Fetch one
/// - `PATCH /api/v1/<resource>/:id` - Update
/// - `DELETE /api/v1/<resource>/:id` - Delete
/// - `PATCH /api/v1/<resource>/:id/soft-delete` - Soft delete
pub fn resource_router<R: Resource>(
    controller: Arc<ResourceController<R>>,
    mapper: ErrorMapper,
) -> Router {
    let collection = format!("{}/{}", API_PREFIX, controller.resource_name());
    let item = format!("{}/:{}", collection, controller.id_param());
    let soft_delete = format!("{}/soft-delete", item);

    Router::new()
        .route(&collection, get(list_handler::<R>).post(create_handler::<R>))
        .route(
            &item,
            get(get_handler::<R>)
                .patch(update_handler::<R>)
                .delete(destroy_handler::<R>),
        )
        .route(&soft_delete, patch(soft_delete_handler::<R>))
        .with_state(ResourceState { controller, mapper })
}

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /` - Online message
/// - `GET /health` - Health check endpoint
/// - `GET /stats` - Cache statistics
/// - everything in `api`, usually merged [`resource_router`]s
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState, api: Router) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
        .merge(api)
        .fallback(fallback_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
