//! API Handlers
//!
//! HTTP request handlers: the generic resource endpoints plus the root,
//! health, stats and fallback endpoints.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::Uri,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::cache::SharedCache;
use crate::crud::ResourceController;
use crate::engine::Resource;
use crate::error::{AppError, AppResult, ErrorMapper, FieldIssue};
use crate::models::{ApiResponse, HealthResponse, StatsResponse};

const INVALID_URL: &str = "Invalid URL, please try again!";

// == App State ==
/// State of the introspection endpoints.
#[derive(Clone)]
pub struct AppState {
    pub cache: SharedCache,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(cache: SharedCache) -> Self {
        Self {
            cache,
            started_at: Instant::now(),
        }
    }
}

// == Resource State ==
/// State of one resource's endpoints.
pub struct ResourceState<R: Resource> {
    pub controller: Arc<ResourceController<R>>,
    pub mapper: ErrorMapper,
}

impl<R: Resource> Clone for ResourceState<R> {
    fn clone(&self) -> Self {
        Self {
            controller: Arc::clone(&self.controller),
            mapper: self.mapper,
        }
    }
}

impl<R: Resource> ResourceState<R> {
    fn reply(&self, result: AppResult<ApiResponse<Value>>) -> Response {
        match result {
            Ok(response) => response.into_response(),
            Err(err) => self.mapper.respond(err),
        }
    }
}

fn json_body(body: Result<Json<Value>, JsonRejection>) -> AppResult<Value> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::validation("body", rejection.body_text()))
}

// == Resource Handlers ==
/// GET /api/v1/<resource>
pub async fn list_handler<R: Resource>(
    State(state): State<ResourceState<R>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.reply(state.controller.get_all(&params).await)
}

/// GET /api/v1/<resource>/:id
pub async fn get_handler<R: Resource>(
    State(state): State<ResourceState<R>>,
    Path(params): Path<HashMap<String, String>>,
) -> Response {
    state.reply(state.controller.get_single(&params).await)
}

/// POST /api/v1/<resource>
pub async fn create_handler<R: Resource>(
    State(state): State<ResourceState<R>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let result = match json_body(body) {
        Ok(body) => state.controller.create(body).await,
        Err(err) => Err(err),
    };
    state.reply(result)
}

/// PATCH /api/v1/<resource>/:id
pub async fn update_handler<R: Resource>(
    State(state): State<ResourceState<R>>,
    Path(params): Path<HashMap<String, String>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let result = match json_body(body) {
        Ok(body) => state.controller.update(&params, body).await,
        Err(err) => Err(err),
    };
    state.reply(result)
}

/// DELETE /api/v1/<resource>/:id
pub async fn destroy_handler<R: Resource>(
    State(state): State<ResourceState<R>>,
    Path(params): Path<HashMap<String, String>>,
) -> Response {
    state.reply(state.controller.destroy(&params).await)
}

/// PATCH /api/v1/<resource>/:id/soft-delete
pub async fn soft_delete_handler<R: Resource>(
    State(state): State<ResourceState<R>>,
    Path(params): Path<HashMap<String, String>>,
) -> Response {
    state.reply(state.controller.soft_delete(&params).await)
}

// == Introspection Handlers ==
/// Handler for GET /
pub async fn root_handler() -> ApiResponse<Value> {
    ApiResponse::success(200, Some(json!({ "message": "Server is online" })))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.started_at.elapsed().as_secs()))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.cache.read().await.stats();

    Json(StatsResponse {
        hits: stats.hits,
        misses: stats.misses,
        total_entries: stats.total_entries,
        hit_rate: stats.hit_rate(),
        dirty: stats.dirty,
    })
}

/// Fallback for unmatched routes.
pub async fn fallback_handler(uri: Uri) -> ApiResponse<()> {
    ApiResponse::failure(
        404,
        INVALID_URL,
        vec![FieldIssue::new(
            uri.path(),
            format!("Can't find {} on this server", uri.path()),
        )],
    )
}
