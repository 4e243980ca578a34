//! Store configuration

use serde::{Deserialize, Serialize};

/// Connection settings for one SQLite store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite connection URL
    pub database_url: String,
    /// Maximum pooled connections
    pub max_connections: u32,
}

impl StoreConfig {
    /// Gate-local store settings from the environment
    pub fn gate_from_env() -> Self {
        Self {
            database_url: std::env::var("GATE_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:palegate-gate.db?mode=rwc".to_string()),
            max_connections: max_connections_from_env(),
        }
    }

    /// Backend canonical store settings from the environment
    pub fn backend_from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:palegate-backend.db?mode=rwc".to_string()),
            max_connections: max_connections_from_env(),
        }
    }
}

fn max_connections_from_env() -> u32 {
    std::env::var("DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5)
}
