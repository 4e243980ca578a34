//! Token error taxonomy
//!
//! Each verification failure maps to a distinct operator-facing deny reason.

use thiserror::Error;

/// Token codec errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token audience mismatch")]
    InvalidAudience,

    #[error("token issuer mismatch")]
    InvalidIssuer,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("codec has no signing key configured")]
    SignerUnavailable,

    #[error("failed to encode token: {0}")]
    Encoding(String),
}

impl TokenError {
    /// Short reason string printed after `DENY:` at the scan point
    pub fn deny_reason(&self) -> String {
        match self {
            Self::Expired => "token expired".to_string(),
            Self::InvalidSignature => "invalid signature".to_string(),
            Self::InvalidAudience => "invalid audience (aud)".to_string(),
            Self::InvalidIssuer => "invalid issuer (iss)".to_string(),
            Self::Malformed(msg) => format!("invalid token ({msg})"),
            other => other.to_string(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAudience => Self::InvalidAudience,
            ErrorKind::InvalidIssuer => Self::InvalidIssuer,
            ErrorKind::InvalidRsaKey(reason) => Self::InvalidKey(reason.clone()),
            ErrorKind::InvalidKeyFormat => Self::InvalidKey(err.to_string()),
            _ => Self::Malformed(err.to_string()),
        }
    }
}

/// Result type for token operations
pub type TokenResult<T> = Result<T, TokenError>;
