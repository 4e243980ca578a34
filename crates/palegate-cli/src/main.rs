//! Palegate Gate CLI - operator commands for the gatehouse node
//!
//! Every command works entirely against the local SQLite store; only the
//! sync and repair commands talk to the backend.
//!
//! # Quick start
//!
//! ```bash
//! # Simulate an entry scan from a QR payload
//! palegate-gate process-token --token "$JWT" --mode entry
//!
//! # Run the replication worker
//! palegate-gate sync-to-backend
//!
//! # Close stale entries (daily cron)
//! palegate-gate auto-exit-midnight --hours 20
//!
//! # Disaster recovery: replay the full local log
//! palegate-gate repair-sync-full --since 2026-01-01T00:00:00Z
//! ```

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{
    auto_exit_midnight, generate_test_token, process_token, repair_sync_full, sync_to_backend,
};
use palegate_gate::GateConfig;

/// Palegate gate node operator CLI
#[derive(Parser)]
#[command(name = "palegate-gate")]
#[command(author = "Palegate Contributors")]
#[command(version)]
#[command(about = "Offline scan processing and backend replication for the gatehouse", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a backend-issued token and run the scan state machine
    ProcessToken(process_token::ProcessTokenArgs),

    /// Drain outbox rows to the backend sync endpoint
    SyncToBackend(sync_to_backend::SyncToBackendArgs),

    /// Close stale ENTERED entries and emit the matching events
    AutoExitMidnight(auto_exit_midnight::AutoExitMidnightArgs),

    /// Replay the full local log to the backend (idempotent)
    RepairSyncFull(repair_sync_full::RepairSyncFullArgs),

    /// Sign test tokens for scan simulation (dev gates only)
    GenerateTestToken(generate_test_token::GenerateTestTokenArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Keep stdout clean for the scanner-facing ALLOW/DENY output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = GateConfig::from_env();

    let exit_code = match cli.command {
        Commands::ProcessToken(args) => process_token::run(args, &config).await?,
        Commands::SyncToBackend(args) => sync_to_backend::run(args, &config).await?,
        Commands::AutoExitMidnight(args) => auto_exit_midnight::run(args, &config).await?,
        Commands::RepairSyncFull(args) => repair_sync_full::run(args, &config).await?,
        Commands::GenerateTestToken(args) => generate_test_token::run(args, &config).await?,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
