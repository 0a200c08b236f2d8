//! # dcloud-node
//!
//! Rebuilds registry state from the transaction journal and checks it.
//!
//! On start the node opens the SQLite journal (`DCLOUD_JOURNAL_PATH` or the
//! platform data directory), replays every committed transaction into a
//! fresh executor and audits that each storage account's aggregates match
//! its live files. A non-zero exit means the journal could not be replayed
//! or the audit found drift.

use anyhow::{bail, Context};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dcloud_registry::{RegistryConfig, TransactionExecutor};

/// What a replay found.
#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    owners: usize,
    live_files: usize,
    /// Saturates at `u64::MAX`
    bytes: u64,
    committed: usize,
    rejected: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dcloud_registry=debug")),
        )
        .init();

    info!("Starting DCloud node v{}", env!("CARGO_PKG_VERSION"));

    let config = RegistryConfig::from_env();
    info!(?config, "Loaded configuration");

    let summary = replay(&config)?;
    info!(
        owners = summary.owners,
        live_files = summary.live_files,
        bytes = summary.bytes,
        committed = summary.committed,
        rejected = summary.rejected,
        "Registry state verified"
    );
    Ok(())
}

fn replay(config: &RegistryConfig) -> anyhow::Result<Summary> {
    let executor = TransactionExecutor::open(config).context("failed to replay journal")?;

    let mismatches = executor.audit();
    if !mismatches.is_empty() {
        for m in &mismatches {
            error!(
                owner = %m.owner,
                recorded = ?m.recorded,
                derived = ?m.derived,
                "Storage account disagrees with its files"
            );
        }
        bail!("quota audit failed for {} account(s)", mismatches.len());
    }

    let mut summary = Summary::default();
    for owner in executor.owners() {
        let files = executor.list_by_owner(&owner);
        summary.owners += 1;
        summary.live_files += files.len();
        summary.bytes = files
            .iter()
            .fold(summary.bytes, |total, f| total.saturating_add(f.file_size));
    }
    for record in executor.history()? {
        match record.sequence() {
            Some(_) => summary.committed += 1,
            None => summary.rejected += 1,
        }
    }
    Ok(summary)
}
