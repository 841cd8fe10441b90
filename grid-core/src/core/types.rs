//! Core order types for the grid market-making engine.
//!
//! Orders are plain value records with a stable `id`; the Grid Store owns
//! the canonical copy and strategy/accounting code works from snapshots or
//! explicit indices, never from shared mutable references.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a grid slot, constant across the order's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// The DEX's own order identifier, assigned once a slot is placed on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainOrderId(pub String);

impl fmt::Display for ChainOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the grid an order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Buy,
    Sell,
    /// Placeholder occupying the zone around market price. Must never go
    /// on-chain.
    Spread,
}

impl OrderType {
    /// The trading side this order type is associated with for fund
    /// accounting, or `None` for `Spread` (which has no committed funds).
    pub fn side(self) -> Option<Side> {
        match self {
            OrderType::Buy => Some(Side::Buy),
            OrderType::Sell => Some(Side::Sell),
            OrderType::Spread => None,
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Buy => write!(f, "BUY"),
            OrderType::Sell => write!(f, "SELL"),
            OrderType::Spread => write!(f, "SPREAD"),
        }
    }
}

/// The two sides of the fund model (buy-side quote funds, sell-side base
/// funds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_order_type(self) -> OrderType {
        match self {
            Side::Buy => OrderType::Buy,
            Side::Sell => OrderType::Sell,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Lifecycle state of a grid slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    /// Not on-chain. No `chainOrderId`.
    Virtual,
    /// Fully on-chain at the slot's target size.
    Active,
    /// On-chain but partially filled; size reduced below target.
    Partial,
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderState::Virtual => write!(f, "VIRTUAL"),
            OrderState::Active => write!(f, "ACTIVE"),
            OrderState::Partial => write!(f, "PARTIAL"),
        }
    }
}

/// Strategy-owned flags carried on a grid slot. Kept as a closed struct
/// (not an open map) since the strategy only ever needs these fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderMetadata {
    /// Set while a rotation for this slot is in flight.
    pub pending_rotation: bool,
    /// Set when this slot has absorbed outer dust (Anchor-and-Refill).
    /// `None` means the slot is not currently doubled.
    pub merged_dust_size: Option<Decimal>,
    /// Cumulative fills applied to a doubled slot since the merge.
    pub filled_since_refill: Decimal,
    /// True while `merged_dust_size` is outstanding.
    pub is_double_order: bool,
}

/// A grid slot: the fundamental entity the engine mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub chain_order_id: Option<ChainOrderId>,
    pub order_type: OrderType,
    pub state: OrderState,
    pub price: Decimal,
    pub size: Decimal,
    pub metadata: OrderMetadata,
}

impl Order {
    /// Build a fresh VIRTUAL slot as produced by the grid-geometry
    /// calculator at startup or grid rebuild.
    pub fn new_virtual(id: OrderId, order_type: OrderType, price: Decimal, size: Decimal) -> Self {
        Self {
            id,
            chain_order_id: None,
            order_type,
            state: OrderState::Virtual,
            price,
            size,
            metadata: OrderMetadata::default(),
        }
    }

    pub fn is_on_chain(&self) -> bool {
        matches!(self.state, OrderState::Active | OrderState::Partial)
    }

    /// A "phantom": on-chain state without a chain order id. Never valid.
    pub fn is_phantom(&self) -> bool {
        self.is_on_chain() && self.chain_order_id.is_none()
    }

    pub fn side(&self) -> Option<Side> {
        self.order_type.side()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_virtual_has_no_chain_id() {
        let o = Order::new_virtual(OrderId(1), OrderType::Buy, dec!(100), dec!(1));
        assert_eq!(o.state, OrderState::Virtual);
        assert!(o.chain_order_id.is_none());
        assert!(!o.is_phantom());
    }

    #[test]
    fn side_mapping() {
        assert_eq!(OrderType::Buy.side(), Some(Side::Buy));
        assert_eq!(OrderType::Sell.side(), Some(Side::Sell));
        assert_eq!(OrderType::Spread.side(), None);
    }
}
