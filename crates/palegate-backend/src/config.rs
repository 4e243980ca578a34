//! Backend API configuration

use palegate_types::DEFAULT_SYNC_MAX_EVENTS;

/// Settings consumed by the request handlers
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Shared credential expected in `X-GATE-API-KEY` (`GATE_API_KEY`).
    /// Unset means the sync endpoint answers 500 to everything.
    pub gate_api_key: Option<String>,
    /// Kiosk credential for the dashboard view (`DASHBOARD_KIOSK_TOKEN`)
    pub kiosk_token: Option<String>,
    /// Hard cap on events per sync request (`SYNC_MAX_EVENTS`)
    pub sync_max_events: usize,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self {
            gate_api_key: non_empty(std::env::var("GATE_API_KEY").ok()),
            kiosk_token: non_empty(std::env::var("DASHBOARD_KIOSK_TOKEN").ok()),
            sync_max_events: std::env::var("SYNC_MAX_EVENTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SYNC_MAX_EVENTS),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            gate_api_key: None,
            kiosk_token: None,
            sync_max_events: DEFAULT_SYNC_MAX_EVENTS,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
