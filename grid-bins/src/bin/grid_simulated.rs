//! Runs the grid engine's cycle (reconcile → recalculate → plan →
//! broadcast → persist) against a scripted `MockDexClient`, for local
//! dry runs and demos. Grounded on the teacher's per-strategy simulated
//! binaries (`simple_spread_simulated`, `inventory_simulated`); this
//! engine has one strategy, so one binary suffices.

use anyhow::Result;
use clap::Parser;
use grid_bins::common::{install_shutdown_flag, init_logging, CommonArgs};
use grid_bins::geometry::ConfiguredGeometry;
use grid_core::accounting::Accountant;
use grid_core::core::types::{OrderId, OrderType, Side};
use grid_core::interfaces::{DexClient, GridGeometry};
use grid_core::manager::Manager;
use grid_core::persistence::FileJournal;
use grid_core::store::GridStore;
use grid_core::strategy::{GridSnapshot, StrategyEngine};
use grid_core::sync::{fill_op_from_record, SyncEngine};
use grid_core::testing::MockDexClient;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::Ordering;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CommonArgs::parse();
    let config = args.load_config()?;
    init_logging(&config);

    tracing::info!(market_id = config.dex.market_id, "starting grid-simulated");

    let shutdown = install_shutdown_flag();

    let geometry = ConfiguredGeometry::new(&config.grid);
    let mut store = build_initial_grid(&geometry, &config.grid);

    let mut accountant = Accountant::new(
        Decimal::new(1, config.dex.base_precision.max(config.dex.quote_precision) as u32),
        config.accounting.invariant_tolerance_pct,
        config.accounting.bts_fee_reservation_multiplier,
        config.accounting.native_fee_side,
    );
    accountant.recalculate(&store, (config.grid.bot_funds, config.grid.bot_funds));

    let sync_engine = SyncEngine::new(
        config.accounting.eps_price,
        config.accounting.relative_slack,
        config.dex.base_precision,
        config.dex.quote_precision,
    );
    let strategy = StrategyEngine::new(
        config.accounting.dust_threshold_pct,
        config.accounting.merge_tolerance_pct,
        1.0,
        config.accounting.spread_skip_floor_factor,
        config.grid.target_spread_percent,
    );

    let dex = MockDexClient::new();
    let journal = FileJournal::open(&config.persistence.journal_path)?;
    let mut manager = Manager::new(
        std::time::Duration::from_millis(config.locks.lock_timeout_ms),
        std::time::Duration::from_millis(config.locks.pipeline_timeout_ms),
    );

    const CYCLES: u32 = 20;
    for cycle in 1..=CYCLES {
        if shutdown.load(Ordering::SeqCst) {
            tracing::info!("stopping after cycle {}", cycle - 1);
            break;
        }

        manager.flags.is_bootstrapping = cycle <= 2;
        let _grid_guard = manager.locks.acquire_grid_lock().await;

        let on_chain = dex.read_open_orders().await?;
        let outcome = sync_engine.reconcile_with(
            &mut store,
            &on_chain,
            (config.grid.active_orders.buy, config.grid.active_orders.sell),
        );

        for correction in &outcome.corrections {
            tracing::warn!(?correction, "price correction queued");
        }

        let mut any_fill = false;
        for fill in &outcome.fills {
            any_fill = true;
            let fee_op = fill_op_from_record(fill, 10);
            accountant.process_fill(&fee_op);
        }

        for slot in &outcome.activated {
            if let Some(order) = store.get(*slot).cloned() {
                if let Some(side) = order.side() {
                    let precision = match side {
                        Side::Buy => config.dex.quote_precision,
                        Side::Sell => config.dex.base_precision,
                    };
                    let size_f64 = order.size.to_string().parse::<f64>().unwrap_or(0.0);
                    let human = grid_core::units::HumanAmount::tag(size_f64)?;
                    let amount = grid_core::units::ChainAmount::from_human(human, precision)?;
                    if let Ok(chain_id) = dex.place_order(side, order.price, amount).await {
                        sync_engine.create_order(&mut store, &mut accountant, order.id, chain_id)?;
                    }
                }
            }
        }

        for chain_id in &outcome.cancel_requests {
            dex.cancel_order(chain_id).await?;
            sync_engine.cancel_order(&mut store, &mut accountant, chain_id);
        }

        if any_fill {
            let snapshot = GridSnapshot::new(cycle as u64, store.all().cloned().collect());
            let excluded: HashSet<String> = HashSet::new();
            let locked: HashSet<OrderId> = HashSet::new();
            let rotated: HashSet<OrderId> = HashSet::new();
            for side in [Side::Buy, Side::Sell] {
                let order_type = side.as_order_type();
                let plan = strategy.rebalance_on_fill(
                    &snapshot,
                    side.other(),
                    match side {
                        Side::Buy => config.grid.active_orders.buy,
                        Side::Sell => config.grid.active_orders.sell,
                    },
                    |id| {
                        store
                            .get(id)
                            .map(|o| geometry.ideal_size(side, o.price).as_decimal())
                            .unwrap_or(Decimal::ZERO)
                    },
                    &excluded,
                    &locked,
                    &rotated,
                );
                for item in plan {
                    tracing::info!(?item, side = ?order_type, "strategy plan item");
                }
            }
        }

        accountant.recalculate(&store, (config.grid.bot_funds, config.grid.bot_funds));
        let report = accountant.verify_invariants(cycle <= 2);
        if report.reason.is_some() {
            tracing::warn!(?report, "fund invariant drift");
        }

        let has_phantom_orders = store.all().any(|o| o.is_phantom());
        let invariant_violation = accountant.to_error(&report);
        manager
            .persist_if_sound(has_phantom_orders, true, invariant_violation, || async {
                journal
                    .persist(
                        &store.all().cloned().collect::<Vec<_>>(),
                        accountant.buy.cache_funds,
                        accountant.sell.cache_funds,
                        accountant.bts_fees_owed,
                    )
                    .await
            })
            .await?;

        tracing::info!(cycle, orders = store.len(), "cycle complete");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    tracing::info!("grid-simulated finished");
    Ok(())
}

fn build_initial_grid(geometry: &ConfiguredGeometry, grid: &grid_core::config::GridConfig) -> GridStore {
    let mut store = GridStore::new();
    let mut next_id = 1u64;

    for i in 1..=(grid.active_orders.buy * 2).max(1) {
        let price = geometry.slot_price(-(i as i64));
        let size = geometry.ideal_size(Side::Buy, price).as_decimal();
        store
            .upsert(grid_core::core::types::Order::new_virtual(
                OrderId(next_id),
                OrderType::Buy,
                price,
                size,
            ))
            .expect("fresh virtual orders are always legal");
        next_id += 1;
    }

    for i in 1..=(grid.active_orders.sell * 2).max(1) {
        let price = geometry.slot_price(i as i64);
        let size = geometry.ideal_size(Side::Sell, price).as_decimal();
        store
            .upsert(grid_core::core::types::Order::new_virtual(
                OrderId(next_id),
                OrderType::Sell,
                price,
                size,
            ))
            .expect("fresh virtual orders are always legal");
        next_id += 1;
    }

    store
}
