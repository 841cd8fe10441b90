//! Grid Store (spec.md §2, component A): the canonical in-memory map of
//! grid slots plus the secondary indices the Sync and Strategy engines
//! query by. Single-writer: only the component holding `gridLock` may
//! call `upsert`/`delete` (enforced by the lock registry in `manager`,
//! not here — this module trusts its caller, the way the teacher's
//! `orderbook` module trusts its single feed-thread writer).

use crate::core::errors::IndexError;
use crate::core::order_fsm;
use crate::core::types::{Order, OrderId, OrderState, OrderType};
use crate::errors::ErrorKind;
use std::collections::{HashMap, HashSet};

/// The canonical order map plus `byState`/`byType` secondary indices.
#[derive(Debug, Default)]
pub struct GridStore {
    orders: HashMap<OrderId, Order>,
    by_state: HashMap<OrderState, HashSet<OrderId>>,
    by_type: HashMap<OrderType, HashSet<OrderId>>,
}

impl GridStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Insert or replace a slot. Runs `order_fsm::validate_transition`
    /// first and detects/downgrades phantom orders before the slot ever
    /// lands in the index (spec.md §3): the store never holds an illegal
    /// ACTIVE/PARTIAL-without-chain-id record.
    pub fn upsert(&mut self, order: Order) -> Result<(), ErrorKind> {
        let order = match order_fsm::validate_transition(&order) {
            Ok(()) => order,
            Err(ErrorKind::IllegalTransition { reason }) if order.is_phantom() => {
                tracing::error!(slot = %order.id, %reason, "downgrading phantom order to VIRTUAL");
                order_fsm::downgrade_phantom(&order)
            }
            Err(e) => return Err(e),
        };

        if let Some(old) = self.orders.get(&order.id) {
            self.by_state.entry(old.state).or_default().remove(&order.id);
            self.by_type.entry(old.order_type).or_default().remove(&order.id);
        }

        self.by_state.entry(order.state).or_default().insert(order.id);
        self.by_type.entry(order.order_type).or_default().insert(order.id);
        self.orders.insert(order.id, order);
        Ok(())
    }

    /// Remove a slot entirely (used only when a grid is rebuilt at a new
    /// geometry; ordinary lifecycle transitions go through `upsert`).
    pub fn delete(&mut self, id: OrderId) -> Option<Order> {
        let removed = self.orders.remove(&id)?;
        self.by_state.entry(removed.state).or_default().remove(&id);
        self.by_type.entry(removed.order_type).or_default().remove(&id);
        Some(removed)
    }

    /// Slots matching both a type and a state, the Strategy Engine's most
    /// common query shape (e.g. "all ACTIVE BUY slots").
    pub fn by_type_and_state(&self, order_type: OrderType, state: OrderState) -> Vec<&Order> {
        let type_set = self.by_type.get(&order_type);
        let state_set = self.by_state.get(&state);
        match (type_set, state_set) {
            (Some(types), Some(states)) => types
                .intersection(states)
                .filter_map(|id| self.orders.get(id))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn by_state(&self, state: OrderState) -> Vec<&Order> {
        self.by_state
            .get(&state)
            .into_iter()
            .flatten()
            .filter_map(|id| self.orders.get(id))
            .collect()
    }

    pub fn by_type(&self, order_type: OrderType) -> Vec<&Order> {
        self.by_type
            .get(&order_type)
            .into_iter()
            .flatten()
            .filter_map(|id| self.orders.get(id))
            .collect()
    }

    /// Structural self-check: every index entry must point at a real
    /// order in the primary map, every order must appear in its matching
    /// index, and an id may not appear twice in the same index dimension
    /// under different keys.
    pub fn validate_indices(&self) -> Result<(), IndexError> {
        for (state, ids) in &self.by_state {
            for id in ids {
                match self.orders.get(id) {
                    None => return Err(IndexError::OrphanIndexEntry { index: "byState" }),
                    Some(o) if o.state != *state => {
                        return Err(IndexError::DuplicateIndexEntry { index: "byState" })
                    }
                    _ => {}
                }
            }
        }
        for (order_type, ids) in &self.by_type {
            for id in ids {
                match self.orders.get(id) {
                    None => return Err(IndexError::OrphanIndexEntry { index: "byType" }),
                    Some(o) if o.order_type != *order_type => {
                        return Err(IndexError::DuplicateIndexEntry { index: "byType" })
                    }
                    _ => {}
                }
            }
        }
        for (id, order) in &self.orders {
            if !self
                .by_state
                .get(&order.state)
                .map(|s| s.contains(id))
                .unwrap_or(false)
            {
                return Err(IndexError::MissingIndexEntry { index: "byState" });
            }
            if !self
                .by_type
                .get(&order.order_type)
                .map(|s| s.contains(id))
                .unwrap_or(false)
            {
                return Err(IndexError::MissingIndexEntry { index: "byType" });
            }
        }
        Ok(())
    }

    /// Rebuild both indices from the primary map, discarding whatever
    /// inconsistency `validate_indices` found. The one operation allowed
    /// to repair rather than reject (spec.md §7: `IndexCorruption` is
    /// fatal only when repair also fails).
    pub fn repair_indices(&mut self) {
        self.by_state.clear();
        self.by_type.clear();
        for (id, order) in &self.orders {
            self.by_state.entry(order.state).or_default().insert(*id);
            self.by_type.entry(order.order_type).or_default().insert(*id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::OrderType;
    use rust_decimal_macros::dec;

    fn virt(id: u64, order_type: OrderType) -> Order {
        Order::new_virtual(OrderId(id), order_type, dec!(100), dec!(1))
    }

    #[test]
    fn upsert_then_get() {
        let mut store = GridStore::new();
        store.upsert(virt(1, OrderType::Buy)).unwrap();
        assert!(store.get(OrderId(1)).is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn by_type_and_state_filters_correctly() {
        let mut store = GridStore::new();
        store.upsert(virt(1, OrderType::Buy)).unwrap();
        store.upsert(virt(2, OrderType::Sell)).unwrap();
        let buys = store.by_type_and_state(OrderType::Buy, OrderState::Virtual);
        assert_eq!(buys.len(), 1);
        assert_eq!(buys[0].id, OrderId(1));
    }

    #[test]
    fn upsert_moves_between_indices_on_state_change() {
        let mut store = GridStore::new();
        store.upsert(virt(1, OrderType::Buy)).unwrap();
        let mut active = store.get(OrderId(1)).unwrap().clone();
        active.state = OrderState::Active;
        active.chain_order_id = Some(crate::core::types::ChainOrderId("c1".into()));
        store.upsert(active).unwrap();
        assert!(store.by_state(OrderState::Virtual).is_empty());
        assert_eq!(store.by_state(OrderState::Active).len(), 1);
    }

    #[test]
    fn upsert_downgrades_phantom_instead_of_storing_it() {
        let mut store = GridStore::new();
        let mut phantom = virt(1, OrderType::Buy);
        phantom.state = OrderState::Active;
        store.upsert(phantom).unwrap();
        let stored = store.get(OrderId(1)).unwrap();
        assert_eq!(stored.state, OrderState::Virtual);
        assert!(stored.chain_order_id.is_none());
    }

    #[test]
    fn upsert_rejects_spread_going_active() {
        let mut store = GridStore::new();
        let mut spread = virt(1, OrderType::Spread);
        spread.state = OrderState::Active;
        spread.chain_order_id = Some(crate::core::types::ChainOrderId("c1".into()));
        assert!(matches!(
            store.upsert(spread),
            Err(ErrorKind::IllegalTransition { .. })
        ));
    }

    #[test]
    fn delete_removes_from_all_indices() {
        let mut store = GridStore::new();
        store.upsert(virt(1, OrderType::Buy)).unwrap();
        store.delete(OrderId(1));
        assert!(store.get(OrderId(1)).is_none());
        assert!(store.by_type_and_state(OrderType::Buy, OrderState::Virtual).is_empty());
    }

    #[test]
    fn validate_indices_passes_on_well_formed_store() {
        let mut store = GridStore::new();
        store.upsert(virt(1, OrderType::Buy)).unwrap();
        store.upsert(virt(2, OrderType::Sell)).unwrap();
        assert!(store.validate_indices().is_ok());
    }

    #[test]
    fn validate_indices_detects_orphan_and_repair_fixes_it() {
        let mut store = GridStore::new();
        store.upsert(virt(1, OrderType::Buy)).unwrap();
        store.by_state.entry(OrderState::Virtual).or_default().insert(OrderId(99));
        assert!(store.validate_indices().is_err());
        store.repair_indices();
        assert!(store.validate_indices().is_ok());
    }
}
