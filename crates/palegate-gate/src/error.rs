//! Gate node error types

use thiserror::Error;

/// Gate-side operation errors
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Store error: {0}")]
    Db(#[from] palegate_db::DbError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for gate operations
pub type GateResult<T> = Result<T, GateError>;
