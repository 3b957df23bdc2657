//! Cache Module
//!
//! In-memory key-value cache with TTL expiry, dirty tracking and JSON
//! snapshot persistence.

mod entry;
mod persist;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use persist::{FlushOutcome, LoadOutcome, PersistenceManager};
pub use stats::CacheStats;
pub use store::{CacheStore, SharedCache, Snapshot};
