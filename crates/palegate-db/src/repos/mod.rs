//! Repositories - one per domain entity
//!
//! All functions take any [`sqlx::SqliteExecutor`], so callers choose between
//! pool-level autocommit and an enclosing transaction.

pub mod entry;
pub mod exit;
pub mod outbox;
pub mod processed;
pub mod users;

pub use entry::{EntryRepo, EntryReplica};
pub use exit::{ExitRepo, ExitReplica};
pub use outbox::OutboxRepo;
pub use processed::ProcessedRepo;
pub use users::UserRepo;
