//! `generate-test-token`: sign tokens for scan simulation
//!
//! Only works on gates holding a private key (dev/staging). The output is a
//! bare token on stdout so it pipes straight into `process-token`.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use clap::{Args, ValueEnum};
use serde_json::Value;
use uuid::Uuid;

use palegate_gate::GateConfig;
use palegate_token::{EmergencyExitTokenSpec, EntryTokenSpec, TokenCodec};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Entry,
    Exit,
}

#[derive(Args)]
pub struct GenerateTestTokenArgs {
    /// Target roll number
    #[arg(long)]
    roll: String,

    /// Token type
    #[arg(long, value_enum, default_value = "entry")]
    mode: ModeArg,

    /// Bind to a specific entry record (defaults to a fresh UUID for entry
    /// tokens)
    #[arg(long)]
    entry_id: Option<Uuid>,

    /// Laptop description carried in the payload
    #[arg(long)]
    laptop: Option<String>,

    /// Extra items; repeat the flag for several
    #[arg(long)]
    extra: Vec<String>,

    /// Shift iat this many hours into the past (expired-token simulation)
    #[arg(long)]
    backdate_hours: Option<i64>,

    /// Explicit createdAt claim consumed by the test-mode scan path
    #[arg(long)]
    created_at: Option<DateTime<Utc>>,

    /// Entry token lifetime override in seconds
    #[arg(long)]
    ttl_secs: Option<i64>,

    /// Path to the private key PEM (default: GATE_PRIVATE_KEY_PATH)
    #[arg(long)]
    key: Option<PathBuf>,
}

pub async fn run(args: GenerateTestTokenArgs, config: &GateConfig) -> anyhow::Result<i32> {
    let private_path = args
        .key
        .clone()
        .or_else(|| config.private_key_path.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("keys/private.pem"));

    let private_pem = std::fs::read_to_string(&private_path).map_err(|e| {
        anyhow::anyhow!(
            "cannot read private key at {} ({e}); test tokens need a signing key",
            private_path.display()
        )
    })?;
    let public_pem = std::fs::read_to_string(&config.public_key_path)?;
    let codec = TokenCodec::with_signer(&public_pem, &private_pem)?;

    let issued_at = args
        .backdate_hours
        .map(|hours| Utc::now() - Duration::hours(hours));
    let extra: Vec<Value> = args.extra.iter().cloned().map(Value::String).collect();

    let token = match args.mode {
        ModeArg::Entry => codec.sign_entry(EntryTokenSpec {
            entry_id: args.entry_id.unwrap_or_else(Uuid::new_v4),
            roll: args.roll.clone(),
            laptop: args.laptop.clone(),
            extra,
            ttl_secs: args.ttl_secs,
            issued_at,
            created_at: args.created_at,
        })?,
        ModeArg::Exit => codec.sign_emergency_exit(EmergencyExitTokenSpec {
            entry_id: args.entry_id,
            exit_id: None,
            roll: args.roll.clone(),
            laptop: args.laptop.clone(),
            extra,
            issued_at,
        })?,
    };

    println!("{token}");
    Ok(0)
}
