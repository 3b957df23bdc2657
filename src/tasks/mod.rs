//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired cache entries at configured intervals
//! - Snapshot Flush: Writes the cache to disk when it changed

mod cleanup;
mod flush;

pub use cleanup::spawn_cleanup_task;
pub use flush::spawn_flush_task;
