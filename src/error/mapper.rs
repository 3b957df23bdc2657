//! Error Mapper
//!
//! Single point where a failure raised anywhere in the pipeline becomes the
//! error envelope sent back to the caller.

use std::error::Error as StdError;

use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use crate::config::Config;
use crate::engine::{EngineError, KnownErrorCode, KnownRequestError};
use crate::error::{AppError, CredentialError, FieldIssue};
use crate::models::ApiResponse;

// == Error Envelope ==
/// Normalized description of one failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub status_code: u16,
    pub success: bool,
    pub message: String,
    pub error_messages: Vec<FieldIssue>,
}

impl ErrorEnvelope {
    fn new(status_code: u16, message: impl Into<String>, issues: Vec<FieldIssue>) -> Self {
        Self {
            status_code,
            success: false,
            message: message.into(),
            error_messages: issues,
        }
    }

    fn single(
        status_code: u16,
        message: impl Into<String>,
        path: &str,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(status_code, message, vec![FieldIssue::new(path, detail)])
    }
}

// == Error Mapper ==
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorMapper {
    /// Attach diagnostic detail to client-visible responses
    show_stack: bool,
}

impl ErrorMapper {
    pub fn new(show_stack: bool) -> Self {
        Self { show_stack }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.show_stack())
    }

    pub fn show_stack(&self) -> bool {
        self.show_stack
    }

    /// Maps and logs a failure.
    ///
    /// Every failure is logged with its full diagnostic chain, whatever the
    /// `show_stack` setting. Server faults log at error, rejected input at warn.
    pub fn map(&self, err: &AppError) -> ErrorEnvelope {
        let envelope = classify(err);

        if envelope.status_code >= 500 {
            error!(
                status = envelope.status_code,
                error = %err,
                stack = %diagnostic_chain(err),
                "Request failed"
            );
        } else {
            warn!(
                status = envelope.status_code,
                message = %envelope.message,
                stack = %diagnostic_chain(err),
                "Request rejected"
            );
        }

        envelope
    }

    /// Builds the HTTP response for a failure.
    pub fn respond(&self, err: AppError) -> Response {
        let envelope = self.map(&err);
        let stack = self.show_stack.then(|| diagnostic_chain(&err));

        ApiResponse::<()>::failure(
            envelope.status_code,
            envelope.message,
            envelope.error_messages,
        )
        .with_stack(stack)
        .into_response()
    }
}

// == Classification ==
/// Pure mapping from a failure to its envelope. First match wins.
pub fn classify(err: &AppError) -> ErrorEnvelope {
    match err {
        AppError::Engine(EngineError::Known(known)) => classify_known(known),
        AppError::Engine(other) => {
            ErrorEnvelope::single(500, other.to_string(), "", other.to_string())
        }
        AppError::Validation(issues) => ErrorEnvelope::new(400, "Validation Error", issues.clone()),
        AppError::Credential(CredentialError::Expired) => ErrorEnvelope::single(
            401,
            "Token has expired, please log in again",
            "token",
            "Token has expired",
        ),
        AppError::Credential(CredentialError::Invalid) => ErrorEnvelope::single(
            401,
            "Invalid token, please log in again",
            "token",
            "Invalid token",
        ),
        AppError::Domain { status, message } => {
            ErrorEnvelope::single(*status, message.clone(), "", message.clone())
        }
        AppError::Internal(message) => {
            ErrorEnvelope::single(500, message.clone(), "", message.clone())
        }
        AppError::Unknown => ErrorEnvelope::single(
            500,
            "An unknown error occurred",
            "",
            "An unknown error occurred",
        ),
    }
}

fn classify_known(known: &KnownRequestError) -> ErrorEnvelope {
    let target = known.target.as_deref().unwrap_or("unknown");

    match &known.code {
        KnownErrorCode::ValueTooLong => ErrorEnvelope::single(
            400,
            "Input value too long",
            target,
            format!("The value provided for {} is too long", target),
        ),
        KnownErrorCode::UniqueViolation => ErrorEnvelope::single(
            400,
            "Unique constraint violation",
            target,
            format!("Duplicate entry for unique field: {}", target),
        ),
        KnownErrorCode::ForeignKeyViolation => ErrorEnvelope::single(
            400,
            "Foreign key constraint failed",
            target,
            format!("Foreign key constraint failed on the field: {}", target),
        ),
        KnownErrorCode::ConstraintViolation => ErrorEnvelope::single(
            400,
            "Constraint violation",
            "database",
            "A constraint failed on the database",
        ),
        KnownErrorCode::NullConstraintViolation => ErrorEnvelope::single(
            400,
            "Null constraint violation",
            target,
            format!("Null constraint violation on the field: {}", target),
        ),
        KnownErrorCode::MissingRequiredValue => ErrorEnvelope::single(
            400,
            "Missing required value",
            target,
            format!("Missing a required value for {}", target),
        ),
        KnownErrorCode::MissingRequiredArgument => {
            let argument = known.argument.as_deref().unwrap_or("unknown");
            ErrorEnvelope::single(
                400,
                "Missing required argument",
                argument,
                format!("Missing the required argument: {}", argument),
            )
        }
        KnownErrorCode::InvalidRelation => ErrorEnvelope::single(
            400,
            "Invalid relation",
            "relation",
            "The change would violate a required relation",
        ),
        KnownErrorCode::RecordNotFound => ErrorEnvelope::single(
            404,
            "Record not found",
            "record",
            "The requested record does not exist",
        ),
        KnownErrorCode::InvalidConnectionUrl => ErrorEnvelope::single(
            400,
            "Invalid database URL",
            "database",
            "The database connection URL is invalid",
        ),
        KnownErrorCode::BatchFailure => ErrorEnvelope::single(
            400,
            "Batch operation failed",
            "batch",
            "One or more operations in the batch failed",
        ),
        KnownErrorCode::InsufficientPermission => ErrorEnvelope::single(
            403,
            "Insufficient permissions",
            "permission",
            "Insufficient permissions to perform this operation",
        ),
        KnownErrorCode::Unrecognized(code) => ErrorEnvelope::single(
            500,
            "An unknown database error occurred",
            "unknown",
            format!("Unhandled database error code: {}", code),
        ),
    }
}

/// Debug form of the error followed by its source chain.
fn diagnostic_chain(err: &AppError) -> String {
    let mut chain = format!("{:?}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str("\ncaused by: ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
