//! Palegate Token Codec
//!
//! RS256-signed credentials binding a future gate scan to a pre-allocated
//! entry record:
//!
//! - Entry tokens (24 hour expiry by default) carry `entryId` + `roll`
//! - Emergency exit tokens (5 minute expiry) additionally carry
//!   `type = "emergency"` for users who lost the original QR
//!
//! The backend signs with its private key; gates verify offline with only the
//! public key. Expired-but-authentic tokens stay decodable through a
//! controlled fallback so the gate can record that an expired credential was
//! presented.

pub mod claims;
pub mod codec;
pub mod error;

pub use claims::{TokenAction, TokenClaims, EMERGENCY_TOKEN_TYPE};
pub use codec::{
    EmergencyExitTokenSpec, EntryTokenSpec, TokenCodec, EMERGENCY_EXIT_TOKEN_TTL_SECS,
    ENTRY_TOKEN_TTL_SECS, TOKEN_AUDIENCE, TOKEN_ISSUER,
};
pub use error::{TokenError, TokenResult};
