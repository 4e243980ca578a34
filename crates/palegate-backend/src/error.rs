//! API error handling

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error shape returned to clients: a status code plus a `detail` string
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            detail: "Unauthorized".to_string(),
        }
    }

    pub fn forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            detail: "Forbidden".to_string(),
        }
    }

    pub fn too_large(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<palegate_db::DbError> for ApiError {
    fn from(err: palegate_db::DbError) -> Self {
        tracing::error!(error = %err, "database error while handling request");
        Self::internal("Internal server error")
    }
}

impl From<palegate_token::TokenError> for ApiError {
    fn from(err: palegate_token::TokenError) -> Self {
        tracing::error!(error = %err, "token error while handling request");
        Self::internal("Failed to generate token")
    }
}

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;
