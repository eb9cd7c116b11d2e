use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GateError>;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Payload too large: limit is {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: Duration },

    /// Any token failure. The reason is logged where it happens and never
    /// carried in the error itself.
    #[error("Invalid credentials")]
    Unauthorized,

    #[error("Admin required")]
    Forbidden,

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for GateError {
    fn from(err: redis::RedisError) -> Self {
        GateError::Redis(err.to_string())
    }
}

impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        GateError::Serialization(err.to_string())
    }
}

impl From<validator::ValidationErrors> for GateError {
    fn from(err: validator::ValidationErrors) -> Self {
        GateError::ValidationError(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: StatusCode) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code: code.as_u16(),
        }
    }

    pub fn from_gate_error(err: &GateError) -> Self {
        match err {
            GateError::InvalidRequest(msg) => {
                Self::new("bad_request", msg, StatusCode::BAD_REQUEST)
            }
            GateError::ValidationError(msg) => {
                Self::new("validation_error", msg, StatusCode::UNPROCESSABLE_ENTITY)
            }
            GateError::UnsupportedMediaType(_) => Self::new(
                "unsupported_media_type",
                "Unsupported media type",
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            GateError::PayloadTooLarge { .. } => {
                Self::new("payload_too_large", "Payload too large", StatusCode::PAYLOAD_TOO_LARGE)
            }
            GateError::RateLimitExceeded { .. } => Self::new(
                "rate_limit_exceeded",
                "Request rate limit exceeded",
                StatusCode::TOO_MANY_REQUESTS,
            ),
            GateError::Unauthorized => {
                Self::new("unauthorized", "Invalid credentials", StatusCode::UNAUTHORIZED)
            }
            GateError::Forbidden => Self::new("forbidden", "Admin required", StatusCode::FORBIDDEN),
            GateError::Redis(_)
            | GateError::Serialization(_)
            | GateError::ConfigurationError(_)
            | GateError::Internal(_) => Self::new(
                "internal_error",
                "Internal server error",
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_gate_error(&self);
        if body.status().is_server_error() {
            tracing::error!(target: "gatehouse::error", error = %self, "request failed");
        }

        let mut response = (body.status(), Json(body)).into_response();
        if let GateError::RateLimitExceeded { retry_after } = self {
            let secs = retry_after.as_secs().max(1);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
