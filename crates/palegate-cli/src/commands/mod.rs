//! CLI subcommands

pub mod auto_exit_midnight;
pub mod generate_test_token;
pub mod process_token;
pub mod repair_sync_full;
pub mod sync_to_backend;

use palegate_db::{GateStore, StoreConfig};

/// Open (and migrate) the local gate store
pub async fn open_gate_store() -> anyhow::Result<GateStore> {
    let store = GateStore::connect(&StoreConfig::gate_from_env()).await?;
    store.migrate().await?;
    Ok(store)
}
