//! Palegate Database Layer
//!
//! Two fully independent SQLite stores back the pipeline:
//!
//! - **GateStore**: the on-premises node's durable state (users, entry/exit
//!   logs, replication outbox). Survives arbitrary backend outages.
//! - **BackendStore**: the canonical replicated log plus the
//!   `processed_gate_events` idempotency set.
//!
//! Neither store ever queries the other; the sync endpoint is the only
//! interaction between the two nodes.
//!
//! # Repository pattern
//!
//! Each domain has a repository of associated functions taking any
//! `SqliteExecutor`, so the same query runs against the pool or inside a
//! scan-scoped transaction. Multi-statement units (a scan, one replicated
//! event) open a transaction on the owning store's pool.

pub mod config;
pub mod error;
pub mod models;
pub mod repos;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

pub use config::StoreConfig;
pub use error::{DbError, DbResult};
pub use models::*;
pub use repos::*;

/// Gate-local store
#[derive(Clone)]
pub struct GateStore {
    pool: SqlitePool,
}

impl GateStore {
    /// Connect to the gate database
    pub async fn connect(config: &StoreConfig) -> DbResult<Self> {
        let pool = connect_pool(config).await?;
        info!(url = %config.database_url, "Connected to gate store");
        Ok(Self { pool })
    }

    /// Apply the gate schema migrations
    pub async fn migrate(&self) -> DbResult<()> {
        sqlx::migrate!("./migrations/gate")
            .run(&self.pool)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))
    }

    /// Fresh migrated in-memory store (tests and local tooling)
    pub async fn in_memory() -> DbResult<Self> {
        let store = Self {
            pool: memory_pool().await?,
        };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Lightweight liveness probe
    pub async fn health_check(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

/// Backend canonical store
#[derive(Clone)]
pub struct BackendStore {
    pool: SqlitePool,
}

impl BackendStore {
    /// Connect to the backend database
    pub async fn connect(config: &StoreConfig) -> DbResult<Self> {
        let pool = connect_pool(config).await?;
        info!(url = %config.database_url, "Connected to backend store");
        Ok(Self { pool })
    }

    /// Apply the backend schema migrations
    pub async fn migrate(&self) -> DbResult<()> {
        sqlx::migrate!("./migrations/backend")
            .run(&self.pool)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))
    }

    /// Fresh migrated in-memory store (tests and local tooling)
    pub async fn in_memory() -> DbResult<Self> {
        let store = Self {
            pool: memory_pool().await?,
        };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Lightweight liveness probe
    pub async fn health_check(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

async fn connect_pool(config: &StoreConfig) -> DbResult<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| DbError::Connection(e.to_string()))
}

/// A `sqlite::memory:` database disappears with its connection, so the pool
/// is pinned to a single always-alive connection.
async fn memory_pool() -> DbResult<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| DbError::Connection(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn both_schemas_migrate_cleanly() {
        let gate = GateStore::in_memory().await.unwrap();
        gate.health_check().await.unwrap();

        let backend = BackendStore::in_memory().await.unwrap();
        backend.health_check().await.unwrap();
    }
}
