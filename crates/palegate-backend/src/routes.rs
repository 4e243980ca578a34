//! Route definitions

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::handlers;
use crate::state::AppState;

/// Build the backend router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        // Issuance
        .route("/entries/generate", post(handlers::entries::generate_token))
        .route(
            "/entries/generate/exit",
            post(handlers::entries::generate_emergency_exit_token),
        )
        // Gate replication
        .nest("/sync", sync_routes(state.clone()))
        // Analytics view
        .nest("/dashboard", dashboard_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn sync_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/gate/events", post(handlers::sync::gate_events))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_gate_key,
        ))
}

fn dashboard_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/summary", get(handlers::dashboard::summary))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_kiosk_token,
        ))
}
