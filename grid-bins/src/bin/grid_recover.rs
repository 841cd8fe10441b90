//! Replays the crash-recovery journal and reports whether the recovered
//! state is safe to resume trading from, without placing any orders.
//! Grounded on the teacher's recovery-path binaries, which load a
//! persisted book before a live run starts.

use anyhow::Result;
use clap::Parser;
use grid_bins::common::{init_logging, CommonArgs};
use grid_core::core::types::OrderState;
use grid_core::manager::validate_grid_state_for_persistence;
use grid_core::persistence::FileJournal;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CommonArgs::parse();
    let config = args.load_config()?;
    init_logging(&config);

    let journal = FileJournal::open(&config.persistence.journal_path)?;
    let Some(snapshot) = journal.load().await? else {
        tracing::warn!(
            path = %config.persistence.journal_path.display(),
            "no persisted snapshot found, nothing to recover"
        );
        return Ok(());
    };

    let has_phantom_orders = snapshot.orders.iter().any(|o| o.is_phantom());
    let account_totals_initialized = true;

    let validation = validate_grid_state_for_persistence(
        has_phantom_orders,
        account_totals_initialized,
        None,
        false,
    );

    let active = snapshot
        .orders
        .iter()
        .filter(|o| o.state == OrderState::Active)
        .count();
    let partial = snapshot
        .orders
        .iter()
        .filter(|o| o.state == OrderState::Partial)
        .count();
    let virtual_count = snapshot
        .orders
        .iter()
        .filter(|o| o.state == OrderState::Virtual)
        .count();

    tracing::info!(
        version = snapshot.version,
        total = snapshot.orders.len(),
        active,
        partial,
        virtual_count,
        cache_funds_buy = %snapshot.cache_funds_buy,
        cache_funds_sell = %snapshot.cache_funds_sell,
        bts_fees_owed = %snapshot.bts_fees_owed,
        "loaded persisted snapshot"
    );

    match validation {
        Ok(()) => {
            tracing::info!("recovered grid state passes the persistence gate, safe to resume");
        }
        Err(e) => {
            tracing::error!(error = %e, "recovered grid state failed validation, manual intervention required");
            return Err(e.into());
        }
    }

    Ok(())
}
