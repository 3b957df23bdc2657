//! crud_cache - A generic CRUD backend scaffold
//!
//! A controller → service → repository pipeline over a persistence engine,
//! fronted by a read-through cache that is snapshotted to disk, with one
//! error envelope for every failure.

pub mod api;
pub mod cache;
pub mod config;
pub mod crud;
pub mod engine;
pub mod error;
pub mod models;
pub mod resources;
pub mod tasks;

pub use api::{create_router, resource_router, AppState};
pub use cache::{CacheStore, PersistenceManager, SharedCache};
pub use config::Config;
pub use error::{AppError, AppResult, ErrorMapper};
pub use tasks::{spawn_cleanup_task, spawn_flush_task};
