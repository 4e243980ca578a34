//! Shared test scaffolding: a router over a fresh in-memory store

// Each integration test binary only uses a subset of these helpers.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use palegate_backend::{create_router, ApiConfig, AppState};
use palegate_db::BackendStore;
use palegate_token::TokenCodec;

pub const GATE_KEY: &str = "gate-test-key";
pub const KIOSK_TOKEN: &str = "kiosk-test-token";

pub const PUBLIC_PEM: &str = include_str!("../../testdata/public.pem");
pub const PRIVATE_PEM: &str = include_str!("../../testdata/private.pem");

pub async fn test_app() -> (Router, Arc<AppState>) {
    test_app_with(ApiConfig {
        gate_api_key: Some(GATE_KEY.to_string()),
        kiosk_token: Some(KIOSK_TOKEN.to_string()),
        sync_max_events: 500,
    })
    .await
}

pub async fn test_app_with(config: ApiConfig) -> (Router, Arc<AppState>) {
    let store = BackendStore::in_memory().await.unwrap();
    let codec = TokenCodec::with_signer(PUBLIC_PEM, PRIVATE_PEM).unwrap();
    let state = Arc::new(AppState::new(store, codec, config));
    (create_router(state.clone()), state)
}

/// One request through the router, JSON in and out
pub async fn request(
    router: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let request = match body {
        Some(json_body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap_or(json!(null));

    (status, value)
}

/// POST a sync batch with the gate key attached
pub async fn post_events(router: &Router, events: Value) -> (StatusCode, Value) {
    request(
        router,
        "POST",
        "/sync/gate/events",
        &[("X-GATE-API-KEY", GATE_KEY)],
        Some(json!({ "events": events })),
    )
    .await
}
