//! Response DTOs
//!
//! The uniform response envelope plus the bodies of the introspection
//! endpoints.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::FieldIssue;

const DEFAULT_SUCCESS_RESPONSE: &str = "Request completed successfully.";
const DEFAULT_FAILURE_RESPONSE: &str = "Something went wrong.";

// == Meta ==
/// Paging information attached to collection responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Meta {
    pub page: u64,
    pub limit: u64,
    /// Number of items in this page
    pub total: u64,
}

// == Api Response ==
/// Envelope every endpoint answers with. The status code travels next to
/// the body, not inside it.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    #[serde(skip)]
    pub status_code: u16,
    pub success: bool,
    pub message: Option<String>,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldIssue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful response whose message is the status reason phrase.
    pub fn success(status_code: u16, data: Option<T>) -> Self {
        let status_code = valid_status(status_code, true);
        Self {
            status_code,
            success: true,
            message: reason_phrase(status_code),
            response: DEFAULT_SUCCESS_RESPONSE.to_string(),
            meta: None,
            data,
            errors: None,
            stack: None,
        }
    }

    /// Failed response carrying field-level issues.
    pub fn failure(status_code: u16, message: impl Into<String>, errors: Vec<FieldIssue>) -> Self {
        Self {
            status_code: valid_status(status_code, false),
            success: false,
            message: Some(message.into()),
            response: DEFAULT_FAILURE_RESPONSE.to_string(),
            meta: None,
            data: None,
            errors: Some(errors),
            stack: None,
        }
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_stack(mut self, stack: Option<String>) -> Self {
        self.stack = stack;
        self
    }
}

/// Keeps status codes inside [100, 599], falling back on the outcome.
pub fn valid_status(status_code: u16, success: bool) -> u16 {
    match status_code {
        100..=599 => status_code,
        _ if success => 200,
        _ => 500,
    }
}

fn reason_phrase(status_code: u16) -> Option<String> {
    StatusCode::from_u16(status_code)
        .ok()
        .and_then(|status| status.canonical_reason())
        .map(str::to_string)
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status == StatusCode::NO_CONTENT {
            return status.into_response();
        }
        (status, Json(self)).into_response()
    }
}

// == Introspection ==
/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub total_entries: usize,
    /// hits / (hits + misses)
    pub hit_rate: f64,
    pub dirty: bool,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "OK")
    pub message: String,
    pub version: String,
    /// Seconds since the server started
    pub uptime: u64,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn healthy(uptime: u64) -> Self {
        Self {
            message: "OK".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_success_envelope_shape() {
        let resp = ApiResponse::success(201, Some(json!({"id": "1"})));
        let value: Value = serde_json::to_value(&resp).unwrap();

        assert_eq!(resp.status_code, 201);
        assert_eq!(
            value,
            json!({
                "success": true,
                "message": "Created",
                "response": "Request completed successfully.",
                "data": {"id": "1"}
            })
        );
    }

    #[test]
    fn test_failure_envelope_shape() {
        let resp: ApiResponse<()> =
            ApiResponse::failure(404, "Record not found", vec![FieldIssue::new("record", "gone")]);
        let value: Value = serde_json::to_value(&resp).unwrap();

        assert_eq!(value["success"], json!(false));
        assert_eq!(value["message"], json!("Record not found"));
        assert_eq!(value["response"], json!("Something went wrong."));
        assert_eq!(value["errors"][0]["path"], json!("record"));
        assert!(value.get("data").is_none());
        assert!(value.get("stack").is_none());
    }

    #[test]
    fn test_status_is_clamped() {
        assert_eq!(valid_status(42, true), 200);
        assert_eq!(valid_status(700, false), 500);
        assert_eq!(valid_status(418, false), 418);
    }

    #[test]
    fn test_meta_serialized_when_present() {
        let resp = ApiResponse::success(200, Some(vec![1, 2])).with_meta(Meta {
            page: 1,
            limit: 10,
            total: 2,
        });
        let value: Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["meta"], json!({"page": 1, "limit": 10, "total": 2}));
    }

    #[test]
    fn test_no_content_has_empty_body() {
        let response = ApiResponse::<()>::success(204, None).into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy(12);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("OK"));
        assert!(json.contains("timestamp"));
        assert!(json.contains("uptime"));
    }
}
