//! RS256 sign/verify over [`TokenClaims`]

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::Value;
use uuid::Uuid;

use crate::claims::{TokenAction, TokenClaims, EMERGENCY_TOKEN_TYPE};
use crate::error::{TokenError, TokenResult};

/// Required `iss` claim on every credential
pub const TOKEN_ISSUER: &str = "library-backend";

/// Required `aud` claim on every credential
pub const TOKEN_AUDIENCE: &str = "library-gate";

/// Default entry token lifetime: 24 hours
pub const ENTRY_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Emergency exit token lifetime: 5 minutes
pub const EMERGENCY_EXIT_TOKEN_TTL_SECS: i64 = 300;

/// Inputs for signing an entry token
#[derive(Debug, Clone, Default)]
pub struct EntryTokenSpec {
    pub entry_id: Uuid,
    pub roll: String,
    pub laptop: Option<String>,
    pub extra: Vec<Value>,
    /// Overrides the 24h default
    pub ttl_secs: Option<i64>,
    /// Overrides `iat` (test tokens may be backdated)
    pub issued_at: Option<DateTime<Utc>>,
    /// Carried through to replay/test scan paths only
    pub created_at: Option<DateTime<Utc>>,
}

/// Inputs for signing a 5-minute emergency exit token
#[derive(Debug, Clone, Default)]
pub struct EmergencyExitTokenSpec {
    pub entry_id: Option<Uuid>,
    pub exit_id: Option<Uuid>,
    pub roll: String,
    pub laptop: Option<String>,
    pub extra: Vec<Value>,
    pub issued_at: Option<DateTime<Utc>>,
}

/// Token codec owning the key material for one trust domain.
///
/// The backend constructs it [`with_signer`](TokenCodec::with_signer); gates
/// only ever hold the public half via [`verifier`](TokenCodec::verifier).
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
}

impl TokenCodec {
    /// Verify-only codec from a PEM public key
    pub fn verifier(public_pem: &str) -> TokenResult<Self> {
        Self::custom(public_pem, None, TOKEN_ISSUER, TOKEN_AUDIENCE)
    }

    /// Sign+verify codec from a PEM keypair
    pub fn with_signer(public_pem: &str, private_pem: &str) -> TokenResult<Self> {
        Self::custom(public_pem, Some(private_pem), TOKEN_ISSUER, TOKEN_AUDIENCE)
    }

    /// Codec for a non-default trust domain (tests, staging gates)
    pub fn custom(
        public_pem: &str,
        private_pem: Option<&str>,
        issuer: &str,
        audience: &str,
    ) -> TokenResult<Self> {
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())?;
        let encoding_key = private_pem
            .map(|pem| EncodingKey::from_rsa_pem(pem.as_bytes()))
            .transpose()?;

        Ok(Self {
            encoding_key,
            decoding_key,
            issuer: issuer.to_string(),
            audience: audience.to_string(),
        })
    }

    /// Sign an entry token authorising one future entry scan
    pub fn sign_entry(&self, spec: EntryTokenSpec) -> TokenResult<String> {
        let ttl = spec.ttl_secs.unwrap_or(ENTRY_TOKEN_TTL_SECS);
        self.sign(TokenClaims {
            entry_id: Some(spec.entry_id),
            exit_id: None,
            roll: Some(spec.roll),
            action: Some(TokenAction::Entering),
            token_type: None,
            laptop: spec.laptop,
            extra: spec.extra,
            source: None,
            os: None,
            device_meta: None,
            created_at: spec.created_at,
            iss: String::new(),
            aud: String::new(),
            iat: 0,
            exp: 0,
        }, spec.issued_at, ttl)
    }

    /// Sign a short-lived emergency exit token (lost-QR path)
    pub fn sign_emergency_exit(&self, spec: EmergencyExitTokenSpec) -> TokenResult<String> {
        self.sign(TokenClaims {
            entry_id: spec.entry_id,
            exit_id: spec.exit_id,
            roll: Some(spec.roll),
            action: Some(TokenAction::Exiting),
            token_type: Some(EMERGENCY_TOKEN_TYPE.to_string()),
            laptop: spec.laptop,
            extra: spec.extra,
            source: None,
            os: None,
            device_meta: None,
            created_at: None,
            iss: String::new(),
            aud: String::new(),
            iat: 0,
            exp: 0,
        }, spec.issued_at, EMERGENCY_EXIT_TOKEN_TTL_SECS)
    }

    fn sign(
        &self,
        mut claims: TokenClaims,
        issued_at: Option<DateTime<Utc>>,
        ttl_secs: i64,
    ) -> TokenResult<String> {
        let key = self
            .encoding_key
            .as_ref()
            .ok_or(TokenError::SignerUnavailable)?;

        let iat = issued_at.unwrap_or_else(Utc::now);
        let exp = iat + Duration::seconds(ttl_secs);

        claims.iss = self.issuer.clone();
        claims.aud = self.audience.clone();
        claims.iat = iat.timestamp();
        claims.exp = exp.timestamp();

        encode(&Header::new(Algorithm::RS256), &claims, key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Verify signature, issuer, audience and expiry
    pub fn verify(&self, token: &str) -> TokenResult<TokenClaims> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation(true))?;
        Ok(data.claims)
    }

    /// Controlled fallback: decode an *expired* token with the signature,
    /// issuer and audience still fully enforced. Lets the gate record
    /// ENTRY_EXPIRED_SEEN for authentic-but-stale credentials.
    pub fn decode_expired(&self, token: &str) -> TokenResult<TokenClaims> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation(false))?;
        Ok(data.claims)
    }

    fn validation(&self, validate_exp: bool) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = validate_exp;
        validation.leeway = 0;
        validation
    }
}
