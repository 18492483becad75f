use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

pub const CODE_BAD_REQUEST: &str = "BAD_REQUEST";
pub const CODE_UNAUTHORIZED: &str = "UNAUTHORIZED";
pub const CODE_NOT_CONFIGURED: &str = "PROVIDER_NOT_CONFIGURED";
pub const CODE_UPSTREAM: &str = "UPSTREAM_ERROR";
pub const CODE_INTERNAL: &str = "INTERNAL_ERROR";

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    /// Upstream error body, relayed as-is.
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, CODE_BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            CODE_UNAUTHORIZED,
            "Missing or invalid authorization header",
        )
    }

    pub fn not_configured(provider: &str) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            CODE_NOT_CONFIGURED,
            format!("{provider} OAuth client not configured"),
        )
    }

    pub fn upstream(status: StatusCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            details: Some(details),
            ..Self::new(status, CODE_UPSTREAM, message)
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, CODE_INTERNAL, message)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    error_code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            error_code: self.code,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::internal(err.to_string())
    }
}
