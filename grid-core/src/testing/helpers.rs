//! Test fixtures: an in-memory `DexClient`, an in-memory
//! `PersistenceAdapter`, and builders for `Order`/`GridStore`, grounded on
//! the teacher's `testing::helpers` snapshot/position builders (same
//! purpose — give every test a one-line way to build a plausible fixture
//! — retargeted at this engine's domain types).

use crate::core::types::{ChainOrderId, Order, OrderId, OrderState, OrderType, Side};
use crate::errors::ErrorKind;
use crate::interfaces::{AssetFees, Balances, ChainOrder, DexClient, FillEvent, PersistenceAdapter};
use crate::store::GridStore;
use crate::units::ChainAmount;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Build a VIRTUAL order for the given slot/side/price/size.
pub fn virtual_order(id: u64, order_type: OrderType, price: Decimal, size: Decimal) -> Order {
    Order::new_virtual(OrderId(id), order_type, price, size)
}

/// Build an ACTIVE order with a chain id already assigned.
pub fn active_order(id: u64, chain_id: &str, order_type: OrderType, price: Decimal, size: Decimal) -> Order {
    let mut order = Order::new_virtual(OrderId(id), order_type, price, size);
    order.chain_order_id = Some(ChainOrderId(chain_id.to_string()));
    order.state = OrderState::Active;
    order
}

/// Build a PARTIAL order with a chain id and a reduced size.
pub fn partial_order(id: u64, chain_id: &str, order_type: OrderType, price: Decimal, size: Decimal) -> Order {
    let mut order = active_order(id, chain_id, order_type, price, size);
    order.state = OrderState::Partial;
    order
}

/// Build a `GridStore` preloaded with the given orders.
pub fn store_with(orders: impl IntoIterator<Item = Order>) -> GridStore {
    let mut store = GridStore::new();
    for order in orders {
        store.upsert(order).expect("fixture orders must be legal");
    }
    store
}

/// A `DexClient` test double driven entirely from in-memory scripted
/// responses, the way the teacher's `MockHuginnFeed` drove a market feed
/// from a preloaded sequence rather than real I/O.
pub struct MockDexClient {
    open_orders: Mutex<Vec<ChainOrder>>,
    fill_history: Mutex<Vec<FillEvent>>,
    balances: Mutex<Balances>,
    fees: Mutex<AssetFees>,
    next_chain_id: Mutex<u64>,
    placed: Mutex<Vec<(Side, Decimal, ChainAmount)>>,
    cancelled: Mutex<Vec<ChainOrderId>>,
    fail_next_place: Mutex<bool>,
}

impl Default for MockDexClient {
    fn default() -> Self {
        Self {
            open_orders: Mutex::new(Vec::new()),
            fill_history: Mutex::new(Vec::new()),
            balances: Mutex::new(Balances {
                base_free: ChainAmount::new(0),
                quote_free: ChainAmount::new(0),
            }),
            fees: Mutex::new(AssetFees {
                maker_fee_bps: 10,
                taker_fee_bps: 20,
            }),
            next_chain_id: Mutex::new(1),
            placed: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            fail_next_place: Mutex::new(false),
        }
    }
}

impl MockDexClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_open_orders(&self, orders: Vec<ChainOrder>) {
        *self.open_orders.lock().unwrap() = orders;
    }

    pub fn set_fill_history(&self, fills: Vec<FillEvent>) {
        *self.fill_history.lock().unwrap() = fills;
    }

    pub fn set_balances(&self, balances: Balances) {
        *self.balances.lock().unwrap() = balances;
    }

    pub fn fail_next_place(&self) {
        *self.fail_next_place.lock().unwrap() = true;
    }

    pub fn placed_orders(&self) -> Vec<(Side, Decimal, ChainAmount)> {
        self.placed.lock().unwrap().clone()
    }

    pub fn cancelled_orders(&self) -> Vec<ChainOrderId> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl DexClient for MockDexClient {
    async fn place_order(&self, side: Side, price: Decimal, amount: ChainAmount) -> Result<ChainOrderId, ErrorKind> {
        if std::mem::take(&mut *self.fail_next_place.lock().unwrap()) {
            return Err(ErrorKind::ChainRpcFailure(anyhow::anyhow!("mock place_order failure")));
        }
        self.placed.lock().unwrap().push((side, price, amount));
        let mut next = self.next_chain_id.lock().unwrap();
        let id = format!("mock-{next}");
        *next += 1;
        Ok(ChainOrderId(id))
    }

    async fn cancel_order(&self, chain_order_id: &ChainOrderId) -> Result<(), ErrorKind> {
        self.cancelled.lock().unwrap().push(chain_order_id.clone());
        Ok(())
    }

    async fn read_open_orders(&self) -> Result<Vec<ChainOrder>, ErrorKind> {
        Ok(self.open_orders.lock().unwrap().clone())
    }

    async fn read_fill_history(&self, _since_sequence: u64) -> Result<Vec<FillEvent>, ErrorKind> {
        Ok(self.fill_history.lock().unwrap().clone())
    }

    async fn read_balances(&self) -> Result<Balances, ErrorKind> {
        Ok(*self.balances.lock().unwrap())
    }

    async fn read_fees(&self) -> Result<AssetFees, ErrorKind> {
        Ok(*self.fees.lock().unwrap())
    }
}

/// An in-memory `PersistenceAdapter`, for tests that exercise crash
/// recovery without touching the filesystem (`persistence::FileJournal`
/// owns the real on-disk behavior and has its own tests).
#[derive(Default)]
pub struct InMemoryPersistence {
    snapshot: Mutex<Vec<Order>>,
    pub fail_next_persist: Mutex<bool>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preload(&self, orders: Vec<Order>) {
        *self.snapshot.lock().unwrap() = orders;
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryPersistence {
    async fn persist_snapshot(&self, orders: &[Order]) -> Result<(), ErrorKind> {
        if std::mem::take(&mut *self.fail_next_persist.lock().unwrap()) {
            return Err(ErrorKind::PersistenceFailure {
                attempts: 1,
                source: anyhow::anyhow!("mock persist failure"),
            });
        }
        *self.snapshot.lock().unwrap() = orders.to_vec();
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<Vec<Order>, ErrorKind> {
        Ok(self.snapshot.lock().unwrap().clone())
    }
}

/// Assert that an operation completes within an expected latency, used by
/// lock-contention and reconciliation-pass tests.
pub fn assert_within_latency<F>(max_latency: Duration, operation: F, operation_name: &str)
where
    F: FnOnce(),
{
    let start = Instant::now();
    operation();
    let elapsed = start.elapsed();
    assert!(
        elapsed <= max_latency,
        "{operation_name} took {elapsed:?}, expected <= {max_latency:?}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn mock_dex_client_round_trips_placed_orders() {
        let client = MockDexClient::new();
        let id = client
            .place_order(Side::Buy, dec!(100), ChainAmount::new(5_000_000))
            .await
            .unwrap();
        assert_eq!(id.0, "mock-1");
        assert_eq!(client.placed_orders().len(), 1);
    }

    #[tokio::test]
    async fn mock_dex_client_honors_scripted_failure() {
        let client = MockDexClient::new();
        client.fail_next_place();
        let result = client
            .place_order(Side::Sell, dec!(100), ChainAmount::new(1))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn in_memory_persistence_round_trips_orders() {
        let adapter = InMemoryPersistence::new();
        let orders = vec![virtual_order(1, OrderType::Buy, dec!(100), dec!(1))];
        adapter.persist_snapshot(&orders).await.unwrap();
        let loaded = adapter.load_snapshot().await.unwrap();
        assert_eq!(loaded, orders);
    }

    #[test]
    fn store_with_builds_a_populated_store() {
        let store = store_with(vec![
            virtual_order(1, OrderType::Buy, dec!(100), dec!(1)),
            active_order(2, "chain-1", OrderType::Sell, dec!(110), dec!(1)),
        ]);
        assert_eq!(store.len(), 2);
    }
}
