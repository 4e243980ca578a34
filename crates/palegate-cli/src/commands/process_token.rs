//! `process-token`: one gate scan, fully offline
//!
//! Exit code 0 means ALLOW, non-zero means DENY. The printed lines are what
//! the person at the gate sees.

use std::io::Read;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use colored::Colorize;

use palegate_gate::{
    DenyReason, EntryScanNote, GateConfig, ScanDecision, ScanEngine, ScanMode, ScanOptions,
};
use palegate_token::{TokenClaims, TokenCodec, TokenError};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Entry,
    Exit,
}

#[derive(Args)]
pub struct ProcessTokenArgs {
    /// JWT token string; read from stdin when omitted
    #[arg(long)]
    token: Option<String>,

    /// Path to the public key PEM (default: GATE_PUBLIC_KEY_PATH)
    #[arg(long)]
    key: Option<PathBuf>,

    /// Scan mode
    #[arg(long, value_enum, default_value = "entry")]
    mode: ModeArg,

    /// Print the full decoded payload as JSON
    #[arg(long)]
    json: bool,

    /// Enable the replay/test path (honours the timestamp overrides below)
    #[arg(long)]
    test_mode: bool,

    /// Override the scan timestamp (test mode only)
    #[arg(long)]
    override_scanned_at: Option<DateTime<Utc>>,

    /// Override the record creation timestamp (test mode only)
    #[arg(long)]
    override_created_at: Option<DateTime<Utc>>,
}

pub async fn run(args: ProcessTokenArgs, config: &GateConfig) -> anyhow::Result<i32> {
    let token = match args.token.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => token.to_string(),
        _ => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            let token = buffer.trim().to_string();
            if token.is_empty() {
                return deny("no token provided (use --token or pipe token via stdin)");
            }
            token
        }
    };

    let key_path = args
        .key
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.public_key_path));
    let public_pem = match std::fs::read_to_string(&key_path) {
        Ok(pem) => pem,
        Err(_) => {
            return deny(&format!(
                "missing gate public key at {} (copy the backend's public.pem there or set GATE_PUBLIC_KEY_PATH)",
                key_path.display()
            ));
        }
    };
    let codec = TokenCodec::verifier(&public_pem)?;

    // Expired-but-authentic tokens stay decodable so the scan engine can
    // record ENTRY_EXPIRED_SEEN.
    let (claims, expired): (TokenClaims, bool) = match codec.verify(&token) {
        Ok(claims) => (claims, false),
        Err(TokenError::Expired) => match codec.decode_expired(&token) {
            Ok(claims) => (claims, true),
            Err(_) => return deny("token expired and cannot be decoded"),
        },
        Err(err) => return deny(&err.deny_reason()),
    };

    let store = super::open_gate_store().await?;
    let engine = ScanEngine::new(store).with_device_id(config.gate_device_id.clone());

    let opts = ScanOptions {
        test_mode: args.test_mode,
        override_scanned_at: args.override_scanned_at,
        override_created_at: args.override_created_at,
    };
    let mode = match args.mode {
        ModeArg::Entry => ScanMode::Entry,
        ModeArg::Exit => ScanMode::Exit,
    };

    let decision = engine.process(&claims, expired, mode, &opts).await?;

    match decision {
        ScanDecision::Deny(DenyReason::TokenExpired { recorded }) => {
            if recorded {
                println!("  scanned successfully: EXPIRED");
            }
            deny("token expired")
        }
        ScanDecision::Deny(reason) => deny(&reason.to_string()),
        ScanDecision::Allow(details) => {
            match details.entry_note {
                Some(EntryScanNote::Recorded { status, entry_flag }) => {
                    println!("  scanned successfully: {status} {entry_flag}");
                }
                Some(EntryScanNote::DuplicateScan) => {
                    println!("  scanned successfully: DUPLICATE_SCAN");
                }
                Some(EntryScanNote::UnexpectedState { status }) => {
                    println!("  unexpected state for this entry: {status}, ignoring");
                }
                Some(EntryScanNote::NotMaterialized) | None => {}
            }
            if details.exit_flag.is_some() {
                println!("  scanned successfully: EXITED");
            }

            println!("{}", "ALLOW:".green().bold());
            println!("  roll:   {}", details.roll.as_deref().unwrap_or("-"));
            println!(
                "  action: {}",
                details
                    .action
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            println!("  laptop: {}", details.laptop.as_deref().unwrap_or("-"));
            println!("  extra:  {}", serde_json::to_string(&details.extra)?);
            println!(
                "  id:     {}",
                details
                    .id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            if let Some(flag) = details.exit_flag {
                println!("  flag:   {flag}");
            }
            println!("  exp:    {}", details.exp);

            if args.json {
                println!("{}", serde_json::to_string_pretty(&claims)?);
            }
            Ok(0)
        }
    }
}

fn deny(reason: &str) -> anyhow::Result<i32> {
    println!("{} {}", "DENY:".red().bold(), reason);
    Ok(1)
}
