//! CRUD Pipeline
//!
//! Controller → service → repository, generic over the resource type.

pub mod controller;
pub mod hooks;
pub mod query;
pub mod repository;
pub mod service;

pub use controller::{ControllerOptions, ResourceController, DEFAULT_RESOURCE_TTL};
pub use hooks::{NoHooks, ResourceHooks};
pub use query::{parse_query, query_hash, NormalizedQuery};
pub use repository::Repository;
pub use service::{CrudService, Service};
