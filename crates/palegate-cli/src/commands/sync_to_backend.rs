//! `sync-to-backend`: run the replication worker

use std::time::Duration;

use clap::Args;
use colored::Colorize;

use palegate_gate::{GateConfig, SyncWorker};

#[derive(Args)]
pub struct SyncToBackendArgs {
    /// Run a single batch and exit
    #[arg(long)]
    once: bool,

    /// Override SYNC_BATCH_SIZE (keep at or below the server's SYNC_MAX_EVENTS)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override SYNC_INTERVAL_SECONDS
    #[arg(long)]
    sleep: Option<u64>,
}

pub async fn run(args: SyncToBackendArgs, config: &GateConfig) -> anyhow::Result<i32> {
    let store = super::open_gate_store().await?;

    let mut worker = SyncWorker::new(store, config)?;
    if let Some(batch_size) = args.batch_size {
        worker = worker.with_batch_size(batch_size);
    }
    if let Some(sleep) = args.sleep {
        worker = worker.with_interval(Duration::from_secs(sleep));
    }

    if args.once {
        match worker.run_once().await? {
            Some(outcome) => println!(
                "synced batch={} acked={} rejected={}{}",
                outcome.batch,
                outcome.acked,
                outcome.rejected,
                if outcome.retried {
                    " (transport failure, retry scheduled)".yellow().to_string()
                } else {
                    String::new()
                }
            ),
            None => println!("outbox empty, nothing due"),
        }
        return Ok(0);
    }

    println!("{}", "replication worker running; Ctrl+C to stop".dimmed());
    worker.run().await?;
    Ok(0)
}
