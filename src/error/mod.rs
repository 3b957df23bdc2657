//! Error types for the CRUD pipeline
//!
//! Every layer below the HTTP boundary returns [`AppError`], a closed set of
//! failure kinds. The [`mapper`] turns any of them into one error envelope.

pub mod mapper;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EngineError;

pub use mapper::{ErrorEnvelope, ErrorMapper};

// == Field Issue ==
/// One field-level problem reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    /// Name of the offending field, empty when the issue is not tied to one
    pub path: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

// == Credential Error ==
/// Token failures raised by an authentication layer in front of the pipeline.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    #[error("token has expired")]
    Expired,

    #[error("token is invalid")]
    Invalid,
}

// == App Error ==
/// Unified error type for the request pipeline.
#[derive(Error, Debug)]
pub enum AppError {
    /// Failure reported by the persistence engine, carried unchanged
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Request data failed schema validation, one issue per field
    #[error("validation failed for {} field(s)", .0.len())]
    Validation(Vec<FieldIssue>),

    /// Expired or invalid credentials
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Domain failure with an explicit HTTP status
    #[error("{message}")]
    Domain { status: u16, message: String },

    /// Generic failure with a message
    #[error("{0}")]
    Internal(String),

    /// Failure that carried no usable description
    #[error("An unknown error occurred")]
    Unknown,
}

impl AppError {
    // == Constructors ==
    /// 404 for a missing identifier or an absent resource.
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::Domain {
            status: 404,
            message: message.into(),
        }
    }

    /// 501 for an operation the resource does not support.
    pub fn not_implemented(operation: &str) -> Self {
        AppError::Domain {
            status: 501,
            message: format!("{} not implemented", operation),
        }
    }

    /// Validation failure on a single field.
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldIssue::new(path, message)])
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal(message.into())
    }
}

// == Snapshot Error ==
/// Failure while writing or reading the cache snapshot file.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the request pipeline.
pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_domain_404() {
        let err = AppError::not_found("Missing ID parameter");
        assert!(matches!(err, AppError::Domain { status: 404, .. }));
        assert_eq!(err.to_string(), "Missing ID parameter");
    }

    #[test]
    fn test_not_implemented_message() {
        let err = AppError::not_implemented("Soft delete");
        assert_eq!(err.to_string(), "Soft delete not implemented");
        assert!(matches!(err, AppError::Domain { status: 501, .. }));
    }

    #[test]
    fn test_validation_display_counts_fields() {
        let err = AppError::Validation(vec![
            FieldIssue::new("title", "required"),
            FieldIssue::new("body", "too long"),
        ]);
        assert_eq!(err.to_string(), "validation failed for 2 field(s)");
    }

    #[test]
    fn test_engine_error_converts() {
        let err: AppError = EngineError::Other("boom".to_string()).into();
        assert!(matches!(err, AppError::Engine(_)));
        assert_eq!(err.to_string(), "boom");
    }
}
