//! External trait contracts (spec.md §6).
//!
//! The core depends on the outside world only through these traits:
//! `DexClient` (chain reads/writes), `PersistenceAdapter` (crash-recovery
//! journal), and `GridGeometry` (slot-price calculation). Production
//! wiring and test doubles both implement the same trait, the way the
//! teacher's `execution::Executor` abstracts simulated vs. live
//! execution backends behind one interface.

use crate::core::types::{ChainOrderId, Order, Side};
use crate::errors::ErrorKind;
use crate::units::{ChainAmount, HumanAmount};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// A fill event as reported by the chain, in chain-tagged units.
#[derive(Debug, Clone, PartialEq)]
pub struct FillEvent {
    pub chain_order_id: ChainOrderId,
    pub side: Side,
    pub price: Decimal,
    pub filled_amount: ChainAmount,
    pub remaining_amount: ChainAmount,
    /// `true` when the order has fully disappeared from the book.
    pub fully_filled: bool,
}

/// A single resting order as read back from the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOrder {
    pub chain_order_id: ChainOrderId,
    pub side: Side,
    pub price: Decimal,
    pub amount: ChainAmount,
}

/// Per-asset fee figures needed by `deductBtsFees` (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetFees {
    pub maker_fee_bps: u32,
    pub taker_fee_bps: u32,
}

/// Wallet balances in chain-tagged units, split free vs. reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balances {
    pub base_free: ChainAmount,
    pub quote_free: ChainAmount,
}

/// Everything the engine needs from the DEX: placing/cancelling orders,
/// reading the open-order book, and reading fill history for
/// `syncFromFillHistory`'s Anchor-and-Refill pass.
#[async_trait]
pub trait DexClient: Send + Sync {
    async fn place_order(
        &self,
        side: Side,
        price: Decimal,
        amount: ChainAmount,
    ) -> Result<ChainOrderId, ErrorKind>;

    async fn cancel_order(&self, chain_order_id: &ChainOrderId) -> Result<(), ErrorKind>;

    /// All orders this account currently has resting on-chain.
    async fn read_open_orders(&self) -> Result<Vec<ChainOrder>, ErrorKind>;

    /// Fills since `since_sequence`, in chain sequence order, used by the
    /// Anchor-and-Refill reconciliation pass.
    async fn read_fill_history(&self, since_sequence: u64) -> Result<Vec<FillEvent>, ErrorKind>;

    async fn read_balances(&self) -> Result<Balances, ErrorKind>;

    async fn read_fees(&self) -> Result<AssetFees, ErrorKind>;
}

/// A durable record of grid state, written before broadcast and read back
/// on startup (spec.md's crash-recovery requirement, grounded on the
/// teacher's `execution::journal::AsyncJournal`).
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn persist_snapshot(&self, orders: &[Order]) -> Result<(), ErrorKind>;

    async fn load_snapshot(&self) -> Result<Vec<Order>, ErrorKind>;
}

/// Pure function from grid parameters + slot index to a price, kept
/// behind a trait so the Strategy Engine never hardcodes a distribution.
/// The core treats geometry as an opaque input (spec.md §6); only the
/// configured implementation knows how `weight_distribution` maps to a
/// concrete price ladder.
pub trait GridGeometry: Send + Sync {
    /// Price for slot `index` counting up from `min_price`, given the
    /// configured bounds and increment.
    fn slot_price(&self, index: i64) -> Decimal;

    /// Ideal order size for the slot at `price`, given total bot funds
    /// and the configured weight distribution.
    fn ideal_size(&self, side: Side, price: Decimal) -> HumanAmount;
}
