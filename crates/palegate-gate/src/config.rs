//! Gate node configuration

use palegate_types::{
    DEFAULT_SYNC_BATCH_SIZE, DEFAULT_SYNC_INTERVAL_SECONDS, DEFAULT_SYNC_TIMEOUT_SECONDS,
};

/// Runtime configuration of the gate node, read from the environment
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Full URL of the backend sync endpoint (`BACKEND_SYNC_URL`)
    pub backend_sync_url: Option<String>,
    /// Shared credential for the sync endpoint (`GATE_API_KEY`)
    pub gate_api_key: Option<String>,
    /// Events per outbound batch (`SYNC_BATCH_SIZE`)
    pub sync_batch_size: usize,
    /// Sleep between empty-batch ticks (`SYNC_INTERVAL_SECONDS`)
    pub sync_interval_seconds: u64,
    /// Outbound request timeout (`SYNC_TIMEOUT_SECONDS`)
    pub sync_timeout_seconds: u64,
    /// Optional tag injected into `device_meta` (`GATE_DEVICE_ID`)
    pub gate_device_id: Option<String>,
    /// Path of the backend's public verification key (`GATE_PUBLIC_KEY_PATH`)
    pub public_key_path: String,
    /// Path of a private key, only present on test/dev gates
    /// (`GATE_PRIVATE_KEY_PATH`)
    pub private_key_path: Option<String>,
}

impl GateConfig {
    pub fn from_env() -> Self {
        Self {
            backend_sync_url: non_empty(std::env::var("BACKEND_SYNC_URL").ok()),
            gate_api_key: non_empty(std::env::var("GATE_API_KEY").ok()),
            sync_batch_size: parse_env("SYNC_BATCH_SIZE", DEFAULT_SYNC_BATCH_SIZE),
            sync_interval_seconds: parse_env("SYNC_INTERVAL_SECONDS", DEFAULT_SYNC_INTERVAL_SECONDS),
            sync_timeout_seconds: parse_env("SYNC_TIMEOUT_SECONDS", DEFAULT_SYNC_TIMEOUT_SECONDS),
            gate_device_id: non_empty(std::env::var("GATE_DEVICE_ID").ok()),
            public_key_path: std::env::var("GATE_PUBLIC_KEY_PATH")
                .unwrap_or_else(|_| "keys/public.pem".to_string()),
            private_key_path: non_empty(std::env::var("GATE_PRIVATE_KEY_PATH").ok()),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            backend_sync_url: None,
            gate_api_key: None,
            sync_batch_size: DEFAULT_SYNC_BATCH_SIZE,
            sync_interval_seconds: DEFAULT_SYNC_INTERVAL_SECONDS,
            sync_timeout_seconds: DEFAULT_SYNC_TIMEOUT_SECONDS,
            gate_device_id: None,
            public_key_path: "keys/public.pem".to_string(),
            private_key_path: None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
