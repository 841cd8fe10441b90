//! Accountant (spec.md §4.2, component B): the fund model, recomputed as
//! a pure fold over the Grid Store's orders plus chain balances, with an
//! optimistic-adjustment path so the bot sees the effect of its own
//! placements before the next chain poll.

use crate::core::types::{Order, OrderState, OrderType, Side};
use crate::errors::ErrorKind;
use crate::resilience::backoff::{BackoffConfig, ExponentialBackoff};
use crate::store::GridStore;
use rust_decimal::Decimal;
use std::future::Future;

/// The six accumulators per side plus the native-asset fee ledger
/// (spec.md §3 "Fund model").
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SideTotals {
    pub virtual_size: Decimal,
    pub committed_grid: Decimal,
    pub committed_chain: Decimal,
    pub chain_free: Decimal,
    pub cache_funds: Decimal,
    pub available: Decimal,
    pub total_chain: Decimal,
    pub total_grid: Decimal,
}

#[derive(Debug)]
pub struct InvariantReport {
    pub drift_buy: Decimal,
    pub drift_sell: Decimal,
    pub allowed_drift_buy: Decimal,
    pub allowed_drift_sell: Decimal,
    pub reason: Option<String>,
}

/// A single fill, already in human units, as handed to `process_fill`.
#[derive(Debug, Clone, Copy)]
pub struct FillOp {
    pub side: Side,
    pub fill_size: Decimal,
    pub price: Decimal,
    pub maker_fee_bps: u32,
    /// Set when the native fee asset is one of this trade's legs.
    pub native_fee_leg: Option<Decimal>,
}

pub struct Accountant {
    pub buy: SideTotals,
    pub sell: SideTotals,
    pub bts_fees_owed: Decimal,
    pub precision_slack: Decimal,
    pub invariant_tolerance_pct: f64,
    pub fee_reservation_multiplier: f64,
    /// The side whose cacheFunds absorbs `btsFeesOwed` (spec.md §3
    /// `applicableBtsFees`).
    pub native_fee_side: Side,
    recalc_depth: u32,
    dirty: bool,
    pub persistence_warning: bool,
}

impl Accountant {
    pub fn new(
        precision_slack: Decimal,
        invariant_tolerance_pct: f64,
        fee_reservation_multiplier: f64,
        native_fee_side: Side,
    ) -> Self {
        Self {
            buy: SideTotals::default(),
            sell: SideTotals::default(),
            bts_fees_owed: Decimal::ZERO,
            precision_slack,
            invariant_tolerance_pct,
            fee_reservation_multiplier,
            native_fee_side,
            recalc_depth: 0,
            dirty: false,
            persistence_warning: false,
        }
    }

    fn totals_mut(&mut self, side: Side) -> &mut SideTotals {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }

    pub fn totals(&self, side: Side) -> SideTotals {
        match side {
            Side::Buy => self.buy,
            Side::Sell => self.sell,
        }
    }

    /// Suppresses `recalculate` side effects during a burst of mutations;
    /// nested calls stack. Recalculation fires exactly once when the
    /// depth returns to zero via `resume_recalc`.
    pub fn pause_recalc(&mut self) {
        self.recalc_depth += 1;
    }

    pub fn resume_recalc(&mut self, store: &GridStore, chain_free: (Decimal, Decimal)) {
        if self.recalc_depth == 0 {
            return;
        }
        self.recalc_depth -= 1;
        if self.recalc_depth == 0 && self.dirty {
            self.recalculate(store, chain_free);
            self.dirty = false;
        }
    }

    fn is_paused(&self) -> bool {
        self.recalc_depth > 0
    }

    /// Fold all orders into the six accumulators. Called after every state
    /// change unless `pause_recalc` is in effect, in which case the call
    /// is recorded and deferred to `resume_recalc`.
    pub fn recalculate(&mut self, store: &GridStore, chain_free: (Decimal, Decimal)) {
        if self.is_paused() {
            self.dirty = true;
            return;
        }

        let mut buy = SideTotals {
            chain_free: chain_free.0,
            cache_funds: self.buy.cache_funds,
            ..Default::default()
        };
        let mut sell = SideTotals {
            chain_free: chain_free.1,
            cache_funds: self.sell.cache_funds,
            ..Default::default()
        };

        for order in store.all() {
            let Some(side) = order.side() else { continue };
            let totals = match side {
                Side::Buy => &mut buy,
                Side::Sell => &mut sell,
            };
            match order.state {
                OrderState::Virtual => totals.virtual_size += order.size,
                OrderState::Active | OrderState::Partial => {
                    totals.committed_grid += order.size;
                    if order.chain_order_id.is_some() {
                        totals.committed_chain += order.size;
                    }
                }
            }
        }

        for (side, totals) in [(Side::Buy, &mut buy), (Side::Sell, &mut sell)] {
            let applicable_bts_fees = if side == self.native_fee_side {
                self.bts_fees_owed
            } else {
                Decimal::ZERO
            };
            totals.available = (totals.chain_free
                - totals.virtual_size
                - totals.cache_funds
                - applicable_bts_fees)
                .max(Decimal::ZERO);
            totals.total_chain = totals.chain_free + totals.committed_chain;
            totals.total_grid = totals.committed_grid + totals.virtual_size;
        }

        self.buy = buy;
        self.sell = sell;
    }

    /// Adjust `chainFree[side]` for the effect of a just-applied state
    /// transition, ahead of the next chain poll (spec.md §4.2).
    pub fn update_optimistic_free_balance(
        &mut self,
        old_order: Option<&Order>,
        new_order: &Order,
        native_fee: Option<Decimal>,
    ) {
        let Some(side) = new_order.side() else { return };

        match (old_order.map(|o| o.state), new_order.state) {
            (Some(OrderState::Virtual), OrderState::Active) | (None, OrderState::Active) => {
                self.totals_mut(side).chain_free -= new_order.size;
            }
            (Some(OrderState::Active), OrderState::Virtual)
            | (Some(OrderState::Partial), OrderState::Virtual) => {
                if let Some(old) = old_order {
                    self.totals_mut(side).chain_free += old.size;
                }
            }
            (Some(OrderState::Active), OrderState::Partial) => {
                if let Some(old) = old_order {
                    let delta = old.size - new_order.size;
                    self.totals_mut(side).chain_free += delta;
                }
            }
            // PARTIAL -> ACTIVE on the same chainOrderId: already deducted.
            (Some(OrderState::Partial), OrderState::Active) => {}
            _ => {}
        }

        if let Some(fee) = native_fee {
            self.totals_mut(side).chain_free -= fee;
        }
    }

    /// Split a fill into cacheFunds proceeds, a committed-size debit
    /// (applied by the caller via `GridStore::upsert`), and native-fee
    /// accrual.
    pub fn process_fill(&mut self, fill: &FillOp) {
        let gross = fill.fill_size * fill.price;
        let maker_fee = gross * Decimal::from(fill.maker_fee_bps) / Decimal::from(10_000u32);
        let net_proceeds = if fill.native_fee_leg.is_some() {
            // Native fee-asset leg uses its own accounting path, not the
            // maker-fee deduction (spec.md §9 open question, maker path
            // pinned as the default elsewhere).
            gross
        } else {
            gross - maker_fee
        };

        self.totals_mut(fill.side).cache_funds += net_proceeds;

        if let Some(native) = fill.native_fee_leg {
            self.bts_fees_owed += native;
        }
    }

    /// Drain accrued native-asset fees from the native side's cacheFunds.
    /// If the balance is insufficient, keeps a reservation headroom of
    /// `fee_reservation_multiplier * bts_fees_owed` rather than draining
    /// to zero and starving the next rotation's fee budget.
    pub fn deduct_bts_fees(&mut self, native_side: Side) -> Decimal {
        if self.bts_fees_owed <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let totals = self.totals_mut(native_side);
        let reserve = self.bts_fees_owed * Decimal::try_from(self.fee_reservation_multiplier).unwrap_or(Decimal::new(4, 0));

        if totals.cache_funds >= reserve {
            totals.cache_funds -= self.bts_fees_owed;
            let drained = self.bts_fees_owed;
            self.bts_fees_owed = Decimal::ZERO;
            drained
        } else {
            // Not enough headroom: drain what's available and carry the
            // remainder owed forward.
            let available = totals.cache_funds.max(Decimal::ZERO);
            totals.cache_funds -= available;
            self.bts_fees_owed -= available;
            available
        }
    }

    /// Fund invariant: `totalChain[s] ≈ chainFree[s] + committedGrid[s]`
    /// within `max(precisionSlack, 0.1% of totalChain[s])` (spec.md §3,
    /// §8 property 1). `in_bootstrap` suppresses the report as a
    /// violation (still computed, but the caller treats it as advisory).
    pub fn verify_invariants(&self, in_bootstrap: bool) -> InvariantReport {
        let allowed = |totals: &SideTotals| -> Decimal {
            let relative = totals.total_chain.abs()
                * Decimal::try_from(self.invariant_tolerance_pct).unwrap_or(Decimal::new(1, 3));
            self.precision_slack.max(relative)
        };

        let drift_buy = (self.buy.total_chain - self.buy.chain_free - self.buy.committed_grid).abs();
        let drift_sell =
            (self.sell.total_chain - self.sell.chain_free - self.sell.committed_grid).abs();
        let allowed_buy = allowed(&self.buy);
        let allowed_sell = allowed(&self.sell);

        let reason = if in_bootstrap {
            None
        } else if drift_buy > allowed_buy {
            Some(format!(
                "buy drift {} exceeds allowed {}",
                drift_buy, allowed_buy
            ))
        } else if drift_sell > allowed_sell {
            Some(format!(
                "sell drift {} exceeds allowed {}",
                drift_sell, allowed_sell
            ))
        } else {
            None
        };

        InvariantReport {
            drift_buy,
            drift_sell,
            allowed_drift_buy: allowed_buy,
            allowed_drift_sell: allowed_sell,
            reason,
        }
    }

    pub fn to_error(&self, report: &InvariantReport) -> Option<ErrorKind> {
        report.reason.as_ref().map(|_| {
            let (side, drift, allowed) = if report.drift_buy > report.allowed_drift_buy {
                (Side::Buy, report.drift_buy, report.allowed_drift_buy)
            } else {
                (Side::Sell, report.drift_sell, report.allowed_drift_sell)
            };
            ErrorKind::InvariantViolation {
                side,
                drift,
                allowed,
            }
        })
    }

    /// Persist `cacheFunds`/`btsFeesOwed` with up to 3 attempts of
    /// exponential backoff (spec.md §4.2). Final failure sets
    /// `persistence_warning` and returns without propagating.
    pub async fn persist_funds_with_retry<F, Fut>(&mut self, mut write: F)
    where
        F: FnMut(Decimal, Decimal, Decimal) -> Fut,
        Fut: Future<Output = Result<(), ErrorKind>>,
    {
        let mut backoff = ExponentialBackoff::with_config(BackoffConfig::conservative());
        for attempt in 1..=3u32 {
            match write(self.buy.cache_funds, self.sell.cache_funds, self.bts_fees_owed).await {
                Ok(()) => {
                    self.persistence_warning = false;
                    return;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "fund persistence attempt failed");
                    if attempt < 3 {
                        if let Some(delay) = backoff.next_delay() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }
        self.persistence_warning = true;
    }
}

pub fn side_of(order_type: OrderType) -> Option<Side> {
    order_type.side()
}
