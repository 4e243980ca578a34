//! `auto-exit-midnight`: close stale entries (run daily via cron)

use clap::Args;

use palegate_gate::{GateConfig, MidnightCloser, DEFAULT_STALE_HOURS};

#[derive(Args)]
pub struct AutoExitMidnightArgs {
    /// Close entries older than this many hours
    #[arg(long, default_value_t = DEFAULT_STALE_HOURS)]
    hours: i64,

    /// Preview what would happen without making changes
    #[arg(long)]
    dry_run: bool,
}

pub async fn run(args: AutoExitMidnightArgs, _config: &GateConfig) -> anyhow::Result<i32> {
    let store = super::open_gate_store().await?;

    let report = MidnightCloser::new(store).run(args.hours, args.dry_run).await?;

    if report.dry_run {
        println!(
            "auto_exit: DRY RUN - {} stale entries, no changes made",
            report.examined
        );
    } else {
        println!(
            "auto_exit: done. Created {} AUTO_EXIT logs, expired {} entries ({} failed)",
            report.exits_created, report.entries_expired, report.failed
        );
    }

    Ok(if report.failed > 0 { 1 } else { 0 })
}
