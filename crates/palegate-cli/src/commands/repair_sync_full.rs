//! `repair-sync-full`: manual disaster-recovery replay of the local log

use chrono::{DateTime, Utc};
use clap::Args;

use palegate_gate::{GateConfig, RepairFilter, RepairReplayer};

#[derive(Args)]
pub struct RepairSyncFullArgs {
    /// ISO datetime lower bound on created_at
    #[arg(long)]
    since: Option<DateTime<Utc>>,

    /// ISO datetime upper bound on created_at
    #[arg(long)]
    until: Option<DateTime<Utc>>,

    /// Limit to a single roll
    #[arg(long)]
    roll: Option<String>,

    /// Override SYNC_BATCH_SIZE
    #[arg(long)]
    batch_size: Option<usize>,
}

pub async fn run(args: RepairSyncFullArgs, config: &GateConfig) -> anyhow::Result<i32> {
    let store = super::open_gate_store().await?;

    let mut replayer = RepairReplayer::new(store, config)?;
    if let Some(batch_size) = args.batch_size {
        replayer = replayer.with_batch_size(batch_size);
    }

    let filter = RepairFilter {
        since: args.since,
        until: args.until,
        roll: args.roll,
    };

    let report = replayer.run(&filter).await?;
    println!(
        "repair: done. entries sent={} acked={}; exits sent={} acked={}; rejected={}",
        report.entries_sent,
        report.entries_acked,
        report.exits_sent,
        report.exits_acked,
        report.rejected
    );

    Ok(0)
}
