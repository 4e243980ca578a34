//! Palegate Gate Node
//!
//! Everything the on-premises gate does without a network in sight, plus the
//! background task that ships its state changes to the backend:
//!
//! - **Scan engine**: the entry/exit state machine run against the local
//!   store for each verified credential
//! - **Outbox**: every committed state change leaves exactly one durable
//!   event row behind, in the same transaction
//! - **Sync worker**: drains the outbox to the backend in batches with
//!   exponential backoff
//! - **Midnight closer**: expires stale open entries and feeds the same
//!   outbox
//! - **Repair replayer**: full-log replay with deterministic event ids for
//!   disaster recovery
//!
//! The gate never loses a locally-committed change to a network failure: an
//! outbox row persists until the backend acks or explicitly rejects it.

pub mod config;
pub mod error;
pub mod midnight;
pub mod outbox;
pub mod repair;
pub mod scan;
pub mod sync;

pub use config::GateConfig;
pub use error::{GateError, GateResult};
pub use midnight::{MidnightCloser, MidnightReport, DEFAULT_STALE_HOURS};
pub use repair::{RepairFilter, RepairReplayer, RepairReport};
pub use scan::{
    AllowDetails, DenyReason, EntryScanNote, ScanDecision, ScanEngine, ScanMode, ScanOptions,
};
pub use sync::{SyncWorker, TickOutcome};
