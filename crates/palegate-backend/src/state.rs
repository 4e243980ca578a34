//! Application state shared across handlers

use palegate_db::BackendStore;
use palegate_token::TokenCodec;

use crate::config::ApiConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Canonical store
    pub store: BackendStore,
    /// Credential signer/verifier
    pub codec: TokenCodec,
    /// Handler settings
    pub config: ApiConfig,
}

impl AppState {
    pub fn new(store: BackendStore, codec: TokenCodec, config: ApiConfig) -> Self {
        Self {
            store,
            codec,
            config,
        }
    }
}
