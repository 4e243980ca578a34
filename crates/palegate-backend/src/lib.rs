//! Palegate Backend
//!
//! The central node of the pipeline:
//!
//! - **Issuance**: pre-allocates an entry record and returns the signed
//!   credential authorising one future gate scan
//! - **Sync receiver**: accepts replicated gate events, deduplicates them on
//!   `eventId` and reconstructs the canonical log with last-writer-wins
//!   conflict resolution
//! - **Dashboard summary**: a read-only aggregate over the replicated log,
//!   behind a kiosk-token check
//!
//! The receiver is deliberately forgiving about event arrival order: an EXIT
//! seen before its ENTRY leaves a PENDING skeleton behind for the foreign
//! key, and the ENTRY fills it in whenever it shows up.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
