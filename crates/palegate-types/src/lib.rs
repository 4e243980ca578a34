//! Palegate Types - canonical domain types for the gatehouse pipeline
//!
//! This crate contains the foundational types shared by the gate node and the
//! backend, with zero dependencies on other palegate crates:
//!
//! - Entry/exit lifecycle statuses and flags
//! - Replication event types and payload bodies
//! - The gate -> backend sync wire protocol DTOs
//!
//! # Pipeline invariants these types support
//!
//! 1. Every gate-side state change is captured as exactly one outbox event
//! 2. Events are identified by a stable `eventId` UUID (the idempotency key)
//! 3. Conflicts converge by last-writer-wins on `scanned_at`

pub mod event;
pub mod status;
pub mod wire;

pub use event::*;
pub use status::*;
pub use wire::*;

/// Version of the palegate wire schema
pub const WIRE_VERSION: &str = "0.1.0";
