//! Strategy Engine (spec.md §4.4, component D): turns fill events and
//! health checks into an action plan, computed copy-on-write against a
//! base version of the grid and applied atomically on commit (spec.md
//! §5 "Copy-on-write commit").

use crate::core::types::{Order, OrderId, OrderState, OrderType, Side};
use rust_decimal::Decimal;
use std::collections::HashSet;

/// One action the Orchestrator will broadcast to the DEX.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanItem {
    Create {
        slot: OrderId,
        side: Side,
        price: Decimal,
        size: Decimal,
    },
    Cancel {
        slot: OrderId,
        chain_order_id: String,
    },
    Update {
        slot: OrderId,
        chain_order_id: String,
        new_size: Decimal,
        new_price: Option<Decimal>,
    },
    Rotate {
        cancel_slot: OrderId,
        cancel_chain_order_id: String,
        create_slot: OrderId,
        side: Side,
        price: Decimal,
        size: Decimal,
    },
}

/// A copy-on-write view of the grid the Strategy Engine plans against.
/// `base_version` pins the Grid Store generation this snapshot was taken
/// from; if the store advances before commit, `is_stale` reports true
/// and the caller must recompute (spec.md §5, S6).
#[derive(Debug, Clone)]
pub struct GridSnapshot {
    pub base_version: u64,
    orders: Vec<Order>,
}

impl GridSnapshot {
    pub fn new(base_version: u64, orders: Vec<Order>) -> Self {
        Self { base_version, orders }
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Resync orders identified by chainOrderId from master while keeping
    /// `base_version` as-is (spec.md §5: "selectively resynced ... while
    /// keeping its baseVersion current").
    pub fn resync_from(&mut self, master: &[Order], chain_order_ids: &HashSet<String>) {
        for order in &mut self.orders {
            let Some(id) = order.chain_order_id.as_ref().map(|c| c.0.clone()) else {
                continue;
            };
            if !chain_order_ids.contains(&id) {
                continue;
            }
            if let Some(fresh) = master
                .iter()
                .find(|m| m.chain_order_id.as_ref().map(|c| &c.0) == Some(&id))
            {
                *order = fresh.clone();
            }
        }
    }

    pub fn is_stale(&self, current_version: u64) -> bool {
        current_version != self.base_version
    }
}

/// Per-slot classification used by partial-order handling (spec.md
/// §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialClass {
    Dust,
    Substantial,
}

pub fn classify_partial(size: Decimal, ideal_size: Decimal, dust_threshold_pct: f64) -> PartialClass {
    let threshold = ideal_size * Decimal::try_from(dust_threshold_pct).unwrap_or(Decimal::new(5, 2));
    if size < threshold {
        PartialClass::Dust
    } else {
        PartialClass::Substantial
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DoubledFlags {
    pub buy: bool,
    pub sell: bool,
}

pub struct StrategyEngine {
    pub dust_threshold_pct: f64,
    pub merge_tolerance_pct: f64,
    pub min_order_size_factor: f64,
    pub spread_skip_floor_factor: f64,
    pub target_spread_percent: f64,
    pub doubled: DoubledFlags,
}

impl StrategyEngine {
    pub fn new(
        dust_threshold_pct: f64,
        merge_tolerance_pct: f64,
        min_order_size_factor: f64,
        spread_skip_floor_factor: f64,
        target_spread_percent: f64,
    ) -> Self {
        Self {
            dust_threshold_pct,
            merge_tolerance_pct,
            min_order_size_factor,
            spread_skip_floor_factor,
            target_spread_percent,
            doubled: DoubledFlags::default(),
        }
    }

    fn target_for(&self, side: Side, configured_target: usize) -> usize {
        let doubled = match side {
            Side::Buy => self.doubled.buy,
            Side::Sell => self.doubled.sell,
        };
        if doubled {
            configured_target.saturating_sub(1)
        } else {
            configured_target
        }
    }

    /// Core rebalance algorithm (spec.md §4.4): after a fill on side
    /// `filled_side`, rebalance the opposite side.
    pub fn rebalance_on_fill(
        &self,
        snapshot: &GridSnapshot,
        filled_side: Side,
        configured_target: usize,
        ideal_size: impl Fn(OrderId) -> Decimal,
        exclude_chain_order_ids: &HashSet<String>,
        locked: &HashSet<OrderId>,
        recently_rotated: &HashSet<OrderId>,
    ) -> Vec<PlanItem> {
        let opposite = filled_side.other();
        self.rebalance_side(
            snapshot,
            opposite,
            configured_target,
            ideal_size,
            exclude_chain_order_ids,
            locked,
            recently_rotated,
        )
    }

    fn rebalance_side(
        &self,
        snapshot: &GridSnapshot,
        side: Side,
        configured_target: usize,
        ideal_size: impl Fn(OrderId) -> Decimal,
        exclude_chain_order_ids: &HashSet<String>,
        locked: &HashSet<OrderId>,
        recently_rotated: &HashSet<OrderId>,
    ) -> Vec<PlanItem> {
        let order_type = side.as_order_type();
        let target = self.target_for(side, configured_target);

        let active_count = snapshot
            .orders()
            .iter()
            .filter(|o| o.order_type == order_type && o.is_on_chain())
            .count();

        if active_count < target {
            let deficit = target - active_count;
            let mut virtuals: Vec<&Order> = snapshot
                .orders()
                .iter()
                .filter(|o| o.order_type == order_type && o.state == OrderState::Virtual)
                .filter(|o| !o.price.is_zero())
                .collect();
            // Nearest-to-market first: ascending price for SELL, descending for BUY.
            match side {
                Side::Buy => virtuals.sort_by(|a, b| b.price.cmp(&a.price)),
                Side::Sell => virtuals.sort_by_key(|o| o.price),
            }

            virtuals
                .into_iter()
                .filter(|o| {
                    let ideal = ideal_size(o.id);
                    let min_size = ideal * Decimal::try_from(self.min_order_size_factor).unwrap_or(Decimal::new(5, 1));
                    o.size >= min_size
                })
                .take(deficit)
                .map(|o| PlanItem::Create {
                    slot: o.id,
                    side,
                    price: o.price,
                    size: o.size,
                })
                .collect()
        } else if active_count >= target && active_count > 0 {
            let mut active: Vec<&Order> = snapshot
                .orders()
                .iter()
                .filter(|o| o.order_type == order_type && o.is_on_chain())
                .filter(|o| {
                    let excluded_by_chain_id = o
                        .chain_order_id
                        .as_ref()
                        .map(|c| exclude_chain_order_ids.contains(&c.0))
                        .unwrap_or(false);
                    !excluded_by_chain_id && !locked.contains(&o.id) && !recently_rotated.contains(&o.id)
                })
                .collect();
            // Furthest-from-market first: descending price for SELL, ascending for BUY.
            match side {
                Side::Buy => active.sort_by_key(|o| o.price),
                Side::Sell => active.sort_by(|a, b| b.price.cmp(&a.price)),
            }

            let Some(furthest) = active.into_iter().next() else {
                return Vec::new();
            };
            let virtuals_for_rotation = snapshot
                .orders()
                .iter()
                .filter(|o| o.order_type == order_type && o.state == OrderState::Virtual);
            // Nearest-to-market virtual to promote into the freed slot:
            // highest price for BUY, lowest for SELL.
            let inner_slot = match side {
                Side::Buy => virtuals_for_rotation.max_by_key(|o| o.price),
                Side::Sell => virtuals_for_rotation.min_by_key(|o| o.price),
            };
            let Some(inner_slot) = inner_slot else {
                return Vec::new();
            };
            let Some(chain_id) = furthest.chain_order_id.clone() else {
                return Vec::new();
            };

            vec![PlanItem::Rotate {
                cancel_slot: furthest.id,
                cancel_chain_order_id: chain_id.0,
                create_slot: inner_slot.id,
                side,
                price: inner_slot.price,
                size: inner_slot.size,
            }]
        } else {
            Vec::new()
        }
    }

    /// Dust-rebalance trigger rule (spec.md §4.4, §8 property 5): a
    /// single dust partial on one side alone never triggers a rebalance;
    /// dual-side dust, or any actual fill, does.
    pub fn should_rebalance_for_dust(&self, buy_has_dust: bool, sell_has_dust: bool, any_fill: bool) -> bool {
        any_fill || (buy_has_dust && sell_has_dust)
    }

    /// MERGE: the innermost partial absorbs a small outer residual,
    /// provided the merged size stays within `merge_tolerance_pct` of
    /// `ideal_size`. Returns the update item and sets the doubled flag on
    /// success, or `None` if the merge would exceed tolerance (caller
    /// should SPLIT instead).
    pub fn try_merge(
        &mut self,
        innermost: &Order,
        residual: Decimal,
        ideal_size: Decimal,
        side: Side,
    ) -> Option<PlanItem> {
        let merged = innermost.size + residual;
        let tolerance = ideal_size * Decimal::try_from(self.merge_tolerance_pct).unwrap_or(Decimal::new(1, 1));
        if (merged - ideal_size).abs() > tolerance {
            return None;
        }

        match side {
            Side::Buy => self.doubled.buy = true,
            Side::Sell => self.doubled.sell = true,
        }

        let chain_id = innermost.chain_order_id.clone()?;
        Some(PlanItem::Update {
            slot: innermost.id,
            chain_order_id: chain_id.0,
            new_size: merged,
            new_price: None,
        })
    }

    /// SPLIT: anchor the oversized outer partial down to `ideal_size` and
    /// emit the excess as a fresh VIRTUAL residual at an outer slot.
    pub fn split(
        &self,
        outer: &Order,
        ideal_size: Decimal,
        residual_slot: OrderId,
        residual_price: Decimal,
    ) -> Vec<PlanItem> {
        let excess = outer.size - ideal_size;
        let mut items = Vec::new();
        if let Some(chain_id) = outer.chain_order_id.clone() {
            items.push(PlanItem::Update {
                slot: outer.id,
                chain_order_id: chain_id.0,
                new_size: ideal_size,
                new_price: None,
            });
        }
        if excess > Decimal::ZERO {
            items.push(PlanItem::Create {
                slot: residual_slot,
                side: outer.side().unwrap_or(Side::Buy),
                price: residual_price,
                size: excess,
            });
        }
        items
    }

    /// Ghost virtualization: when evaluating multiple partials at once,
    /// treat each as VIRTUAL in budget projections so they don't mutually
    /// block consolidation (spec.md §4.4). Returns a scratch copy; the
    /// real store is untouched.
    pub fn ghost_virtualize(partials: &[Order]) -> Vec<Order> {
        partials
            .iter()
            .map(|o| {
                let mut ghost = o.clone();
                ghost.state = OrderState::Virtual;
                ghost
            })
            .collect()
    }

    /// Spread correction (spec.md §4.4): scales placement size to
    /// `min(idealSize, available)`; skips if available is less than
    /// `spread_skip_floor_factor * dust_size`.
    pub fn spread_correction(
        &self,
        live_spread_pct: f64,
        ideal_size: Decimal,
        available: Decimal,
        dust_size: Decimal,
        slot: OrderId,
        side: Side,
        price: Decimal,
    ) -> Option<PlanItem> {
        if live_spread_pct <= self.target_spread_percent {
            return None;
        }

        let floor = dust_size * Decimal::try_from(self.spread_skip_floor_factor).unwrap_or(Decimal::new(2, 0));
        if available < floor {
            return None;
        }

        let size = ideal_size.min(available);
        Some(PlanItem::Create {
            slot,
            side,
            price,
            size,
        })
    }

    /// Doubled-side semantics (spec.md §4.4): a partial fill on the
    /// doubled side escalates to a full rebalance (one boundary shift); a
    /// full fill triggers two shifts — one for the fill itself, one
    /// synthetic shift to pay the outstanding dust debt.
    pub fn boundary_shifts_for_doubled_fill(&self, side: Side, fully_filled: bool) -> u32 {
        let doubled = match side {
            Side::Buy => self.doubled.buy,
            Side::Sell => self.doubled.sell,
        };
        if !doubled {
            return if fully_filled { 1 } else { 0 };
        }
        if fully_filled {
            2
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ChainOrderId, OrderId};
    use rust_decimal_macros::dec;

    fn active(id: u64, order_type: OrderType, price: Decimal, size: Decimal) -> Order {
        Order {
            id: OrderId(id),
            chain_order_id: Some(ChainOrderId(format!("c{id}"))),
            order_type,
            state: OrderState::Active,
            price,
            size,
            metadata: Default::default(),
        }
    }

    fn virt(id: u64, order_type: OrderType, price: Decimal, size: Decimal) -> Order {
        Order::new_virtual(OrderId(id), order_type, price, size)
    }

    #[test]
    fn rebalance_creates_when_below_target() {
        let snap = GridSnapshot::new(
            1,
            vec![
                active(1, OrderType::Sell, dec!(110), dec!(1)),
                virt(2, OrderType::Sell, dec!(115), dec!(1)),
            ],
        );
        let engine = StrategyEngine::new(0.05, 0.10, 0.5, 2.0, 1.0);
        let plan = engine.rebalance_on_fill(
            &snap,
            Side::Buy,
            2,
            |_| dec!(1),
            &Default::default(),
            &Default::default(),
            &Default::default(),
        );
        assert_eq!(plan.len(), 1);
        assert!(matches!(plan[0], PlanItem::Create { .. }));
    }

    #[test]
    fn rebalance_rotates_when_at_target() {
        let snap = GridSnapshot::new(
            1,
            vec![
                active(1, OrderType::Sell, dec!(110), dec!(1)),
                active(2, OrderType::Sell, dec!(130), dec!(1)),
                virt(3, OrderType::Sell, dec!(105), dec!(1)),
            ],
        );
        let engine = StrategyEngine::new(0.05, 0.10, 0.5, 2.0, 1.0);
        let plan = engine.rebalance_on_fill(
            &snap,
            Side::Buy,
            2,
            |_| dec!(1),
            &Default::default(),
            &Default::default(),
            &Default::default(),
        );
        assert_eq!(plan.len(), 1);
        assert!(matches!(plan[0], PlanItem::Rotate { .. }));
    }

    #[test]
    fn rebalance_creates_when_below_target_buy_side() {
        // BUY: nearest-to-market is the *highest* price, inverse of SELL.
        let snap = GridSnapshot::new(
            1,
            vec![
                active(1, OrderType::Buy, dec!(90), dec!(1)),
                virt(2, OrderType::Buy, dec!(95), dec!(1)),
            ],
        );
        let engine = StrategyEngine::new(0.05, 0.10, 0.5, 2.0, 1.0);
        let plan = engine.rebalance_on_fill(
            &snap,
            Side::Sell,
            2,
            |_| dec!(1),
            &Default::default(),
            &Default::default(),
            &Default::default(),
        );
        assert_eq!(plan.len(), 1);
        assert!(matches!(
            plan[0],
            PlanItem::Create { slot, .. } if slot == OrderId(2)
        ));
    }

    #[test]
    fn rebalance_rotates_when_at_target_buy_side() {
        let snap = GridSnapshot::new(
            1,
            vec![
                active(1, OrderType::Buy, dec!(95), dec!(1)),
                active(2, OrderType::Buy, dec!(70), dec!(1)), // furthest: lowest price
                virt(3, OrderType::Buy, dec!(99), dec!(1)),   // nearest virtual: highest price
            ],
        );
        let engine = StrategyEngine::new(0.05, 0.10, 0.5, 2.0, 1.0);
        let plan = engine.rebalance_on_fill(
            &snap,
            Side::Sell,
            2,
            |_| dec!(1),
            &Default::default(),
            &Default::default(),
            &Default::default(),
        );
        assert_eq!(plan.len(), 1);
        assert!(matches!(
            plan[0],
            PlanItem::Rotate { cancel_slot, create_slot, .. }
                if cancel_slot == OrderId(2) && create_slot == OrderId(3)
        ));
    }

    #[test]
    fn classify_partial_below_threshold_is_dust() {
        assert_eq!(classify_partial(dec!(0.03), dec!(1), 0.05), PartialClass::Dust);
        assert_eq!(
            classify_partial(dec!(0.5), dec!(1), 0.05),
            PartialClass::Substantial
        );
    }

    #[test]
    fn single_side_dust_does_not_trigger_rebalance() {
        let engine = StrategyEngine::new(0.05, 0.10, 0.5, 2.0, 1.0);
        assert!(!engine.should_rebalance_for_dust(true, false, false));
        assert!(engine.should_rebalance_for_dust(true, true, false));
        assert!(engine.should_rebalance_for_dust(false, false, true));
    }

    #[test]
    fn try_merge_sets_doubled_flag_within_tolerance() {
        let mut engine = StrategyEngine::new(0.05, 0.10, 0.5, 2.0, 1.0);
        let innermost = active(1, OrderType::Buy, dec!(100), dec!(0.95));
        let item = engine.try_merge(&innermost, dec!(0.03), dec!(1), Side::Buy);
        assert!(item.is_some());
        assert!(engine.doubled.buy);
    }

    #[test]
    fn try_merge_rejects_when_outside_tolerance() {
        let mut engine = StrategyEngine::new(0.05, 0.10, 0.5, 2.0, 1.0);
        let innermost = active(1, OrderType::Buy, dec!(100), dec!(0.5));
        let item = engine.try_merge(&innermost, dec!(0.8), dec!(1), Side::Buy);
        assert!(item.is_none());
        assert!(!engine.doubled.buy);
    }

    #[test]
    fn split_emits_update_and_residual_create() {
        let engine = StrategyEngine::new(0.05, 0.10, 0.5, 2.0, 1.0);
        let outer = active(1, OrderType::Buy, dec!(90), dec!(1.5));
        let items = engine.split(&outer, dec!(1), OrderId(99), dec!(85));
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn spread_correction_skips_when_underfunded() {
        let engine = StrategyEngine::new(0.05, 0.10, 0.5, 2.0, 1.0);
        let plan = engine.spread_correction(
            2.0,
            dec!(1),
            dec!(0.01),
            dec!(0.1),
            OrderId(1),
            Side::Buy,
            dec!(100),
        );
        assert!(plan.is_none());
    }

    #[test]
    fn spread_correction_places_when_funded() {
        let engine = StrategyEngine::new(0.05, 0.10, 0.5, 2.0, 1.0);
        let plan = engine.spread_correction(
            2.0,
            dec!(1),
            dec!(5),
            dec!(0.1),
            OrderId(1),
            Side::Buy,
            dec!(100),
        );
        assert!(matches!(plan, Some(PlanItem::Create { .. })));
    }

    #[test]
    fn full_fill_on_doubled_side_triggers_two_shifts() {
        let mut engine = StrategyEngine::new(0.05, 0.10, 0.5, 2.0, 1.0);
        engine.doubled.buy = true;
        assert_eq!(engine.boundary_shifts_for_doubled_fill(Side::Buy, true), 2);
        assert_eq!(engine.boundary_shifts_for_doubled_fill(Side::Buy, false), 1);
    }

    #[test]
    fn fill_on_non_doubled_side_triggers_one_shift_on_full_fill_only() {
        let engine = StrategyEngine::new(0.05, 0.10, 0.5, 2.0, 1.0);
        assert_eq!(engine.boundary_shifts_for_doubled_fill(Side::Sell, true), 1);
        assert_eq!(engine.boundary_shifts_for_doubled_fill(Side::Sell, false), 0);
    }

    #[test]
    fn snapshot_detects_staleness() {
        let snap = GridSnapshot::new(5, vec![]);
        assert!(!snap.is_stale(5));
        assert!(snap.is_stale(6));
    }
}
