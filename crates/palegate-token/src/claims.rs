//! Signed token payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// `type` value that marks a short-TTL emergency exit token
pub const EMERGENCY_TOKEN_TYPE: &str = "emergency";

/// Direction the token authorises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenAction {
    Entering,
    Exiting,
}

impl std::fmt::Display for TokenAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Entering => "ENTERING",
            Self::Exiting => "EXITING",
        })
    }
}

/// Full payload of a gate credential, registered claims included.
///
/// All application fields are optional on decode: the gate treats field
/// absence as data, never as a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<TokenAction>,

    /// `"emergency"` on emergency exit tokens, absent otherwise
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default)]
    pub laptop: Option<String>,

    #[serde(default)]
    pub extra: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_meta: Option<Map<String, Value>>,

    /// Explicit record creation time, honoured only by replay/test paths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    pub fn is_emergency(&self) -> bool {
        self.token_type.as_deref() == Some(EMERGENCY_TOKEN_TYPE)
    }
}
