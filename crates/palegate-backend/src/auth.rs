//! Request authentication middlewares
//!
//! Two independent credentials guard the two surfaces: the gate API key on
//! the sync endpoint, and a kiosk token on the dashboard view. Both compare
//! in constant time.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use palegate_types::GATE_API_KEY_HEADER;

use crate::error::ApiError;
use crate::state::AppState;

/// Guard for the sync endpoint: missing header is 401, mismatch 403, and a
/// server with no key configured refuses everything with 500.
pub async fn require_gate_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.gate_api_key.as_deref() else {
        return ApiError::internal("Server misconfigured: GATE_API_KEY is not set")
            .into_response();
    };

    let provided = request
        .headers()
        .get(GATE_API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    let Some(provided) = provided else {
        return ApiError::unauthorized().into_response();
    };

    if !constant_time_eq(provided, expected) {
        return ApiError::forbidden().into_response();
    }

    next.run(request).await
}

/// Guard for the dashboard view: accepts the kiosk token from `?token=` or
/// the `X-Kiosk-Token` header.
pub async fn require_kiosk_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let provided = query_param(request.uri().query(), "token")
        .or_else(|| {
            request
                .headers()
                .get("X-Kiosk-Token")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });

    let authorised = match (state.config.kiosk_token.as_deref(), provided.as_deref()) {
        (Some(expected), Some(token)) => constant_time_eq(token, expected),
        _ => false,
    };

    if !authorised {
        return ApiError {
            status: axum::http::StatusCode::UNAUTHORIZED,
            detail: "Authentication required. Provide a kiosk token.".to_string(),
        }
        .into_response();
    }

    next.run(request).await
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix(name)?.strip_prefix('='))
        .map(str::to_string)
}
