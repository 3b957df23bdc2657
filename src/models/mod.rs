//! Response models for the HTTP surface
//!
//! Serializable envelopes returned by every endpoint.

pub mod responses;

// Re-export commonly used types
pub use responses::{ApiResponse, HealthResponse, Meta, StatsResponse};
