//! Sync Engine (spec.md §4.3, component C): reconciles the Grid Store
//! against authoritative chain state via three distinct entry points —
//! point events (`create_order`/`cancel_order`), full reconciliation
//! (`reconcile_with`, the `readOpenOrders` entry point), and fill-driven
//! reconciliation (`sync_from_fill_history`, including Anchor-and-Refill
//! accounting).

use crate::accounting::{Accountant, FillOp};
use crate::core::order_fsm;
use crate::core::types::{ChainOrderId, Order, OrderId, OrderState, OrderType, Side};
use crate::errors::ErrorKind;
use crate::interfaces::{ChainOrder, FillEvent};
use crate::store::GridStore;
use rust_decimal::Decimal;

/// A grid slot whose matched chain order sits outside price tolerance:
/// the size update is deferred until the price is corrected on-chain
/// (spec.md §4.3 pass 1, S4).
#[derive(Debug, Clone, PartialEq)]
pub struct PriceCorrection {
    pub grid_order_id: OrderId,
    pub chain_order_id: ChainOrderId,
    pub expected_price: Decimal,
    pub actual_price: Decimal,
}

/// A fill detected during reconciliation, queued for the Strategy Engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FillRecord {
    pub order_id: OrderId,
    pub side: Side,
    pub fill_size: Decimal,
    pub price: Decimal,
}

#[derive(Debug, Default)]
pub struct ReconciliationOutcome {
    pub corrections: Vec<PriceCorrection>,
    pub fills: Vec<FillRecord>,
    pub activated: Vec<OrderId>,
    pub cancel_requests: Vec<ChainOrderId>,
}

/// `tolerance(price, size, type, assets) = max(eps_price, price *
/// relative_slack) + priceQuantum(precisions)` (spec.md §4.3). Pinned
/// here as the single formula the rest of the engine relies on (spec.md
/// §9 open question).
pub fn price_tolerance(
    price: Decimal,
    eps_price: Decimal,
    relative_slack: f64,
    base_precision: u32,
    quote_precision: u32,
) -> Decimal {
    let relative = price * Decimal::try_from(relative_slack).unwrap_or(Decimal::new(5, 4));
    let floor = eps_price.max(relative);
    let finer_precision = base_precision.max(quote_precision);
    let price_quantum = Decimal::new(1, finer_precision);
    floor + price_quantum
}

pub struct SyncEngine {
    pub eps_price: Decimal,
    pub relative_slack: f64,
    pub base_precision: u32,
    pub quote_precision: u32,
}

impl SyncEngine {
    pub fn new(eps_price: Decimal, relative_slack: f64, base_precision: u32, quote_precision: u32) -> Self {
        Self {
            eps_price,
            relative_slack,
            base_precision,
            quote_precision,
        }
    }

    fn tolerance(&self, price: Decimal) -> Decimal {
        price_tolerance(
            price,
            self.eps_price,
            self.relative_slack,
            self.base_precision,
            self.quote_precision,
        )
    }

    fn precision_for(&self, side: Side) -> u32 {
        match side {
            Side::Buy => self.quote_precision,
            Side::Sell => self.base_precision,
        }
    }

    /// Point event: a grid slot was placed on-chain.
    pub fn create_order(
        &self,
        store: &mut GridStore,
        accountant: &mut Accountant,
        grid_order_id: OrderId,
        chain_order_id: ChainOrderId,
    ) -> Result<(), ErrorKind> {
        let Some(old) = store.get(grid_order_id).cloned() else {
            return Err(ErrorKind::IllegalTransition {
                reason: format!("create_order: no grid slot {}", grid_order_id),
            });
        };
        let mut new = old.clone();
        new.state = OrderState::Active;
        new.chain_order_id = Some(chain_order_id);
        accountant.update_optimistic_free_balance(Some(&old), &new, None);
        store.upsert(new)
    }

    /// Point event: a chain order was cancelled. Unmatched cancels are a
    /// normal shutdown race — logged, not failed (spec.md §4.3).
    pub fn cancel_order(
        &self,
        store: &mut GridStore,
        accountant: &mut Accountant,
        chain_order_id: &ChainOrderId,
    ) {
        let matched = store
            .all()
            .find(|o| o.chain_order_id.as_ref() == Some(chain_order_id))
            .map(|o| o.id);

        let Some(id) = matched else {
            tracing::info!(%chain_order_id, "cancel for unmatched chain order, ignoring");
            return;
        };
        let old = store.get(id).cloned().unwrap();
        let mut new = old.clone();
        new.state = OrderState::Virtual;
        new.chain_order_id = None;
        accountant.update_optimistic_free_balance(Some(&old), &new, None);
        let _ = store.upsert(new);
    }

    /// Full reconciliation against the account's open orders on this
    /// market (spec.md §4.3 `readOpenOrders`). Callers fetch `on_chain`
    /// from a `DexClient::read_open_orders()` call; kept as an explicit
    /// parameter here rather than taking a `DexClient` so tests can
    /// supply a chain snapshot without wiring one up.
    pub fn reconcile_with(
        &self,
        store: &mut GridStore,
        on_chain: &[ChainOrder],
        target_active: (usize, usize),
    ) -> ReconciliationOutcome {
        let mut outcome = ReconciliationOutcome::default();
        let mut matched_grid: Vec<OrderId> = Vec::new();
        let mut matched_chain: Vec<ChainOrderId> = Vec::new();

        self.pass_one(store, on_chain, &mut matched_grid, &mut matched_chain, &mut outcome);
        self.pass_two(store, on_chain, &mut matched_grid, &mut matched_chain, &mut outcome);
        self.mark_missing_as_filled(store, &matched_grid, &mut outcome);
        self.target_reconciliation(store, target_active, &matched_grid, &mut outcome);

        outcome
    }

    fn pass_one(
        &self,
        store: &mut GridStore,
        on_chain: &[ChainOrder],
        matched_grid: &mut Vec<OrderId>,
        matched_chain: &mut Vec<ChainOrderId>,
        outcome: &mut ReconciliationOutcome,
    ) {
        let candidates: Vec<(OrderId, ChainOrderId)> = store
            .all()
            .filter(|o| o.is_on_chain())
            .filter_map(|o| o.chain_order_id.clone().map(|c| (o.id, c)))
            .collect();

        for (grid_id, chain_id) in candidates {
            let Some(chain_order) = on_chain.iter().find(|c| c.chain_order_id == chain_id) else {
                continue;
            };
            let order = store.get(grid_id).unwrap().clone();
            let tol = self.tolerance(order.price);
            if (order.price - chain_order.price).abs() > tol {
                outcome.corrections.push(PriceCorrection {
                    grid_order_id: grid_id,
                    chain_order_id: chain_id.clone(),
                    expected_price: order.price,
                    actual_price: chain_order.price,
                });
                matched_grid.push(grid_id);
                matched_chain.push(chain_id);
                continue;
            }

            self.reconcile_size(store, &order, chain_order, outcome);
            matched_grid.push(grid_id);
            matched_chain.push(chain_id);
        }
    }

    fn reconcile_size(
        &self,
        store: &mut GridStore,
        order: &Order,
        chain_order: &ChainOrder,
        outcome: &mut ReconciliationOutcome,
    ) {
        let side = order.side().expect("on-chain order always has a side");
        let precision = self.precision_for(side);
        let scale = Decimal::new(1, precision);
        let chain_amount_human =
            Decimal::from_i128_with_scale(chain_order.amount.get(), precision).max(Decimal::ZERO);

        let remainder = chain_amount_human;
        let remainder_units = (remainder / scale).round();

        if remainder_units <= Decimal::ZERO {
            let placeholder = order_fsm::to_spread_placeholder(order);
            let _ = store.upsert(placeholder);
            outcome.fills.push(FillRecord {
                order_id: order.id,
                side,
                fill_size: order.size - remainder,
                price: order.price,
            });
        } else {
            let mut partial = order.clone();
            partial.state = OrderState::Partial;
            partial.size = remainder;
            let _ = store.upsert(partial);
        }
    }

    fn pass_two(
        &self,
        store: &mut GridStore,
        on_chain: &[ChainOrder],
        matched_grid: &mut Vec<OrderId>,
        matched_chain: &mut Vec<ChainOrderId>,
        _outcome: &mut ReconciliationOutcome,
    ) {
        let unmatched_chain: Vec<&ChainOrder> = on_chain
            .iter()
            .filter(|c| !matched_chain.contains(&c.chain_order_id))
            .collect();

        for chain_order in unmatched_chain {
            let order_type = chain_order.side.as_order_type();
            let candidates: Vec<Order> = store
                .by_type(order_type)
                .into_iter()
                .chain(store.by_type(OrderType::Spread))
                .filter(|o| !matched_grid.contains(&o.id))
                .filter(|o| !o.is_on_chain())
                .cloned()
                .collect();

            let tol = self.tolerance(chain_order.price);
            let best = candidates
                .iter()
                .map(|o| (o, (o.price - chain_order.price).abs()))
                .filter(|(_, diff)| *diff <= tol)
                .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap());

            if let Some((slot, _)) = best {
                let mut new = slot.clone();
                new.order_type = order_type;
                new.state = OrderState::Active;
                new.chain_order_id = Some(chain_order.chain_order_id.clone());
                if let Err(e) = store.upsert(new) {
                    tracing::warn!(slot = %slot.id, error = %e, "pass-two match rejected by store");
                    continue;
                }
                matched_grid.push(slot.id);
                matched_chain.push(chain_order.chain_order_id.clone());
            }
        }
    }

    fn mark_missing_as_filled(
        &self,
        store: &mut GridStore,
        matched_grid: &[OrderId],
        outcome: &mut ReconciliationOutcome,
    ) {
        let missing: Vec<Order> = store
            .all()
            .filter(|o| o.is_on_chain() && !matched_grid.contains(&o.id))
            .cloned()
            .collect();

        for order in missing {
            let side = order.side().expect("on-chain order always has a side");
            outcome.fills.push(FillRecord {
                order_id: order.id,
                side,
                fill_size: order.size,
                price: order.price,
            });
            let placeholder = order_fsm::to_spread_placeholder(&order);
            let _ = store.upsert(placeholder);
        }
    }

    fn target_reconciliation(
        &self,
        store: &mut GridStore,
        target_active: (usize, usize),
        matched_grid: &[OrderId],
        outcome: &mut ReconciliationOutcome,
    ) {
        for (side, target) in [(Side::Buy, target_active.0), (Side::Sell, target_active.1)] {
            let order_type = side.as_order_type();
            let active_count = store.by_type(order_type).iter().filter(|o| o.is_on_chain()).count();

            if active_count < target {
                // Nearest-to-market virtual: highest price for BUY, lowest for SELL.
                let nearest = store
                    .by_type_and_state(order_type, OrderState::Virtual)
                    .into_iter()
                    .filter(|o| !matched_grid.contains(&o.id));
                let candidate = match side {
                    Side::Buy => nearest.max_by_key(|o| o.price),
                    Side::Sell => nearest.min_by_key(|o| o.price),
                }
                .cloned();
                if let Some(candidate) = candidate {
                    outcome.activated.push(candidate.id);
                }
            } else if active_count > target {
                // Furthest-from-market active: lowest price for BUY, highest for SELL.
                let active = store.by_type(order_type).into_iter().filter(|o| o.is_on_chain());
                let worst = match side {
                    Side::Buy => active.min_by_key(|o| o.price),
                    Side::Sell => active.max_by_key(|o| o.price),
                };
                if let Some(worst) = worst {
                    if let Some(chain_id) = worst.chain_order_id.clone() {
                        outcome.cancel_requests.push(chain_id);
                    }
                }
            }
        }
    }

    /// Point fill event (spec.md §4.3 `syncFromFillHistory`), including
    /// Anchor-and-Refill accounting for doubled slots.
    pub fn sync_from_fill_history(
        &self,
        store: &mut GridStore,
        event: &FillEvent,
    ) -> Result<Option<FillRecord>, ErrorKind> {
        let Some(order) = store
            .all()
            .find(|o| {
                matches!(o.state, OrderState::Active | OrderState::Partial)
                    && o.chain_order_id.as_ref() == Some(&event.chain_order_id)
            })
            .cloned()
        else {
            tracing::warn!(chain_order_id = %event.chain_order_id, "fill for unmatched chain order");
            return Ok(None);
        };

        let side = order.side().expect("on-chain order always has a side");
        let precision = self.precision_for(side);
        let scale = Decimal::new(1, precision);
        let filled_amount = Decimal::from_i128_with_scale(event.filled_amount.get(), precision);
        let remaining_units = ((order.size - filled_amount) / scale).round();

        let mut next = order.clone();
        let fully_filled = remaining_units <= Decimal::ZERO;

        if fully_filled {
            if order.metadata.is_double_order {
                return Ok(Some(self.apply_anchor_refill(store, &order, filled_amount, true)?));
            }
            next = order_fsm::to_spread_placeholder(&order);
        } else {
            next.state = OrderState::Partial;
            next.size = remaining_units * scale;
            if order.metadata.is_double_order {
                return Ok(Some(self.apply_anchor_refill(store, &order, filled_amount, false)?));
            }
        }

        store.upsert(next)?;
        Ok(Some(FillRecord {
            order_id: order.id,
            side,
            fill_size: filled_amount,
            price: order.price,
        }))
    }

    /// Accumulate `filledSinceRefill` against `mergedDustSize`; only once
    /// the debt is paid does the slot strip the doubled flag and restore
    /// to ACTIVE, flagging a delayed rotation trigger (spec.md §4.3).
    fn apply_anchor_refill(
        &self,
        store: &mut GridStore,
        order: &Order,
        filled_amount: Decimal,
        full_fill: bool,
    ) -> Result<FillRecord, ErrorKind> {
        let side = order.side().expect("doubled slot always has a side");
        let mut next = order.clone();
        next.metadata.filled_since_refill += filled_amount;

        let dust = next.metadata.merged_dust_size.unwrap_or(Decimal::ZERO);
        let settled = next.metadata.filled_since_refill >= dust;

        if settled {
            next.metadata.is_double_order = false;
            next.metadata.merged_dust_size = None;
            next.metadata.filled_since_refill = Decimal::ZERO;
            next.state = OrderState::Active;
        } else if full_fill {
            // Full fill but the debt isn't paid yet: stays ACTIVE with
            // reduced size, still owing dust (spec.md §4.3).
            next.state = OrderState::Active;
            next.size = Decimal::ZERO;
        } else {
            next.state = OrderState::Partial;
        }

        store.upsert(next)?;
        Ok(FillRecord {
            order_id: order.id,
            side,
            fill_size: filled_amount,
            price: order.price,
        })
    }
}

pub fn fill_op_from_record(record: &FillRecord, maker_fee_bps: u32) -> FillOp {
    FillOp {
        side: record.side,
        fill_size: record.fill_size,
        price: record.price,
        maker_fee_bps,
        native_fee_leg: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ChainOrderId, OrderId};
    use crate::units::ChainAmount;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn engine() -> SyncEngine {
        SyncEngine::new(dec!(0.00000001), 0.0005, 8, 8)
    }

    #[test]
    fn price_tolerance_scales_with_price_and_precision() {
        let tol = price_tolerance(dec!(100), dec!(0.00000001), 0.0005, 8, 8);
        assert!(tol > dec!(0.05));
    }

    #[test]
    fn pass_one_reconciles_matching_chain_order_to_partial() {
        let mut store = GridStore::new();
        let mut order = Order::new_virtual(OrderId(1), OrderType::Buy, dec!(100), dec!(5));
        order.state = OrderState::Active;
        order.chain_order_id = Some(ChainOrderId("c1".into()));
        store.upsert(order).unwrap();

        let on_chain = vec![ChainOrder {
            chain_order_id: ChainOrderId("c1".into()),
            side: Side::Buy,
            price: dec!(100),
            amount: ChainAmount::new(300_000_000),
        }];

        let outcome = engine().reconcile_with(&mut store, &on_chain, (1, 1));
        let stored = store.get(OrderId(1)).unwrap();
        assert_eq!(stored.state, OrderState::Partial);
        assert!(outcome.corrections.is_empty());
    }

    #[test]
    fn pass_one_flags_price_mismatch_as_correction() {
        let mut store = GridStore::new();
        let mut order = Order::new_virtual(OrderId(1), OrderType::Buy, dec!(1.2345), dec!(5));
        order.state = OrderState::Active;
        order.chain_order_id = Some(ChainOrderId("c1".into()));
        store.upsert(order).unwrap();

        let on_chain = vec![ChainOrder {
            chain_order_id: ChainOrderId("c1".into()),
            side: Side::Buy,
            price: dec!(1.2399),
            amount: ChainAmount::new(500_000_000),
        }];

        let outcome = engine().reconcile_with(&mut store, &on_chain, (1, 1));
        assert_eq!(outcome.corrections.len(), 1);
        assert_eq!(outcome.corrections[0].expected_price, dec!(1.2345));
    }

    #[test]
    fn missing_from_chain_becomes_spread_placeholder() {
        let mut store = GridStore::new();
        let mut order = Order::new_virtual(OrderId(1), OrderType::Buy, dec!(100), dec!(5));
        order.state = OrderState::Active;
        order.chain_order_id = Some(ChainOrderId("gone".into()));
        store.upsert(order).unwrap();

        let outcome = engine().reconcile_with(&mut store, &[], (0, 0));
        let stored = store.get(OrderId(1)).unwrap();
        assert_eq!(stored.order_type, OrderType::Spread);
        assert_eq!(outcome.fills.len(), 1);
    }

    #[test]
    fn target_reconciliation_activates_highest_price_buy_virtual() {
        // BUY: nearest-to-market virtual is the *highest* price.
        let mut store = GridStore::new();
        store
            .upsert(Order::new_virtual(OrderId(1), OrderType::Buy, dec!(90), dec!(5)))
            .unwrap();
        store
            .upsert(Order::new_virtual(OrderId(2), OrderType::Buy, dec!(95), dec!(5)))
            .unwrap();

        let outcome = engine().reconcile_with(&mut store, &[], (1, 0));
        assert_eq!(outcome.activated, vec![OrderId(2)]);
    }

    #[test]
    fn target_reconciliation_cancels_lowest_price_buy_active() {
        // BUY: furthest-from-market active is the *lowest* price.
        let mut store = GridStore::new();
        let mut near = Order::new_virtual(OrderId(1), OrderType::Buy, dec!(95), dec!(5));
        near.state = OrderState::Active;
        near.chain_order_id = Some(ChainOrderId("near".into()));
        store.upsert(near).unwrap();

        let mut far = Order::new_virtual(OrderId(2), OrderType::Buy, dec!(80), dec!(5));
        far.state = OrderState::Active;
        far.chain_order_id = Some(ChainOrderId("far".into()));
        store.upsert(far).unwrap();

        let on_chain = vec![
            ChainOrder {
                chain_order_id: ChainOrderId("near".into()),
                side: Side::Buy,
                price: dec!(95),
                amount: ChainAmount::new(500_000_000),
            },
            ChainOrder {
                chain_order_id: ChainOrderId("far".into()),
                side: Side::Buy,
                price: dec!(80),
                amount: ChainAmount::new(500_000_000),
            },
        ];

        let outcome = engine().reconcile_with(&mut store, &on_chain, (1, 0));
        assert_eq!(outcome.cancel_requests, vec![ChainOrderId("far".into())]);
    }

    #[test]
    fn pass_two_matches_spread_slot_and_promotes_its_type() {
        let mut store = GridStore::new();
        store
            .upsert(Order::new_virtual(OrderId(1), OrderType::Spread, dec!(100), dec!(5)))
            .unwrap();

        let on_chain = vec![ChainOrder {
            chain_order_id: ChainOrderId("c1".into()),
            side: Side::Buy,
            price: dec!(100),
            amount: ChainAmount::new(500_000_000),
        }];

        let outcome = engine().reconcile_with(&mut store, &on_chain, (0, 0));
        assert!(outcome.corrections.is_empty());
        let stored = store.get(OrderId(1)).unwrap();
        assert_eq!(stored.order_type, OrderType::Buy);
        assert_eq!(stored.state, OrderState::Active);
        assert_eq!(stored.chain_order_id, Some(ChainOrderId("c1".into())));
    }

    #[test]
    fn anchor_refill_settles_once_cumulative_fills_meet_dust() {
        let mut store = GridStore::new();
        let mut order = Order::new_virtual(OrderId(1), OrderType::Buy, dec!(100), dec!(10));
        order.state = OrderState::Partial;
        order.chain_order_id = Some(ChainOrderId("c1".into()));
        order.metadata.is_double_order = true;
        order.metadata.merged_dust_size = Some(dec!(2));
        order.metadata.filled_since_refill = dec!(1.5);
        store.upsert(order).unwrap();

        let event = FillEvent {
            chain_order_id: ChainOrderId("c1".into()),
            side: Side::Buy,
            price: dec!(100),
            filled_amount: ChainAmount::new(50_000_000),
            remaining_amount: ChainAmount::new(950_000_000),
            fully_filled: false,
        };

        engine().sync_from_fill_history(&mut store, &event).unwrap();
        let stored = store.get(OrderId(1)).unwrap();
        assert!(!stored.metadata.is_double_order);
        assert_eq!(stored.state, OrderState::Active);
    }

    proptest! {
        /// spec.md §8 property 7: a partial fill whose residual rounds to
        /// 0 integer units converts to a SPREAD placeholder; a residual of
        /// >= 1 unit keeps the order PARTIAL with that residual as its
        /// size.
        #[test]
        fn tolerance_rounding_picks_spread_or_partial(
            size_units in 1i64..10_000i64,
            filled_units in 0i64..10_000i64,
        ) {
            let precision = 8u32;
            let scale = Decimal::new(1, precision);
            let size = Decimal::new(size_units, precision);

            let mut store = GridStore::new();
            let mut order = Order::new_virtual(OrderId(1), OrderType::Buy, dec!(100), size);
            order.state = OrderState::Active;
            order.chain_order_id = Some(ChainOrderId("c1".into()));
            store.upsert(order).unwrap();

            let event = FillEvent {
                chain_order_id: ChainOrderId("c1".into()),
                side: Side::Buy,
                price: dec!(100),
                filled_amount: ChainAmount::new(filled_units as i128),
                remaining_amount: ChainAmount::new(0),
                fully_filled: false,
            };

            engine().sync_from_fill_history(&mut store, &event).unwrap();
            let stored = store.get(OrderId(1)).unwrap();

            let filled_human = Decimal::new(filled_units, precision);
            let residual_units = ((size - filled_human) / scale).round();

            if residual_units <= Decimal::ZERO {
                prop_assert_eq!(stored.order_type, OrderType::Spread);
            } else {
                prop_assert_eq!(stored.state, OrderState::Partial);
                prop_assert_eq!(stored.size, residual_units * scale);
            }
        }
    }

    proptest! {
        /// spec.md §8 property 6: a doubled slot's delayed-rotation
        /// trigger fires iff the cumulative filled amount across however
        /// many fills meets or exceeds `mergedDustSize`.
        #[test]
        fn anchor_refill_threshold_matches_cumulative_sum(
            dust in 1i64..1000i64,
            fills in prop::collection::vec(1i64..200i64, 1..6),
        ) {
            let precision = 8u32;
            let dust_amount = Decimal::new(dust, precision);

            let mut store = GridStore::new();
            let mut order = Order::new_virtual(OrderId(1), OrderType::Buy, dec!(100), dec!(1000));
            order.state = OrderState::Partial;
            order.chain_order_id = Some(ChainOrderId("c1".into()));
            order.metadata.is_double_order = true;
            order.metadata.merged_dust_size = Some(dust_amount);
            store.upsert(order).unwrap();

            let mut cumulative = Decimal::ZERO;
            for fill_units in &fills {
                if store.get(OrderId(1)).unwrap().state == OrderState::Active
                    && !store.get(OrderId(1)).unwrap().metadata.is_double_order
                {
                    break;
                }
                let fill_human = Decimal::new(*fill_units, precision);
                cumulative += fill_human;
                let event = FillEvent {
                    chain_order_id: ChainOrderId("c1".into()),
                    side: Side::Buy,
                    price: dec!(100),
                    filled_amount: ChainAmount::new(*fill_units as i128),
                    remaining_amount: ChainAmount::new(0),
                    fully_filled: false,
                };
                engine().sync_from_fill_history(&mut store, &event).unwrap();
            }

            let stored = store.get(OrderId(1)).unwrap();
            let settled = cumulative >= dust_amount;
            prop_assert_eq!(!stored.metadata.is_double_order, settled);
        }
    }
}
