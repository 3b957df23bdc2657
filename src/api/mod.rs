//! API Module
//!
//! HTTP handlers and routing binding resource controllers to axum.
//!
//! # Endpoints
//! - `GET /` - Online message
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Cache statistics
//! - `/api/v1/<resource>[/:id[/soft-delete]]` - Resource CRUD

pub mod handlers;
pub mod routes;

pub use handlers::{AppState, ResourceState};
pub use routes::{create_router, resource_router, API_PREFIX};
