// src/api/error.rs
// Error-to-response mapping for the HTTP surface.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::error::HivemindError;

#[derive(Debug)]
pub struct ApiError {
    pub message: String,
    pub status_code: StatusCode,
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::BAD_REQUEST,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::NOT_FOUND,
        }
    }
}

impl From<HivemindError> for ApiError {
    fn from(err: HivemindError) -> Self {
        let status = match &err {
            HivemindError::Validation(_) => StatusCode::BAD_REQUEST,
            HivemindError::Isolation(_) | HivemindError::Security(_) => StatusCode::FORBIDDEN,
            HivemindError::Upstream { .. } => StatusCode::SERVICE_UNAVAILABLE,
            HivemindError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            HivemindError::Exhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            HivemindError::Consistency(_)
            | HivemindError::Store(_)
            | HivemindError::Serde(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("API internal error: {}", err);
        }

        // Internal detail stays in the logs; clients get the category.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal error".to_string()
        } else {
            err.to_string()
        };

        Self {
            message,
            status_code: status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": true,
            "message": self.message,
            "status": self.status_code.as_u16(),
        });
        (self.status_code, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
