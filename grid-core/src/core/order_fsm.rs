//! Order state machine.
//!
//! Unlike a compile-time typestate machine, transitions here are validated
//! at runtime: the Grid Store receives externally-sourced mutations (chain
//! reconciliation, fills, strategy actions) and must reject illegal ones
//! rather than refuse to compile them. Valid transitions (spec.md §3):
//!
//! - VIRTUAL -> ACTIVE (successful on-chain placement)
//! - ACTIVE -> PARTIAL (partial fill)
//! - PARTIAL -> ACTIVE (consolidation back to ideal size)
//! - ACTIVE/PARTIAL -> VIRTUAL (cancel)
//! - ACTIVE/PARTIAL -> SPREAD-VIRTUAL (full fill; size reset to zero)

use crate::core::types::{Order, OrderState, OrderType};
use crate::errors::ErrorKind;

/// Validate that `next` is a legal successor to `prev` for the given
/// order, independent of *why* the transition is happening. Illegal
/// transitions named in spec.md §3:
///
/// - any SPREAD-typed order entering ACTIVE or PARTIAL
/// - any ACTIVE/PARTIAL order without a `chain_order_id` (a phantom)
/// - updating an order whose id does not match an existing slot is handled
///   by the caller (`GridStore::upsert`), not here
pub fn validate_transition(next: &Order) -> Result<(), ErrorKind> {
    if next.order_type == OrderType::Spread
        && matches!(next.state, OrderState::Active | OrderState::Partial)
    {
        return Err(ErrorKind::IllegalTransition {
            reason: format!(
                "SPREAD slot {} cannot enter {} (SPREAD must never go on-chain)",
                next.id, next.state
            ),
        });
    }

    if next.is_phantom() {
        return Err(ErrorKind::IllegalTransition {
            reason: format!(
                "slot {} is {} without a chain_order_id (phantom)",
                next.id, next.state
            ),
        });
    }

    Ok(())
}

/// Downgrade a phantom order to VIRTUAL, per spec.md §3 ("Detection
/// downgrades to VIRTUAL and logs an error"). The caller is responsible for
/// emitting the log; this is the pure data transformation.
pub fn downgrade_phantom(order: &Order) -> Order {
    let mut downgraded = order.clone();
    downgraded.state = OrderState::Virtual;
    downgraded.chain_order_id = None;
    downgraded
}

/// Transition an order into the SPREAD placeholder state on full fill or
/// chain-confirmed disappearance: state VIRTUAL, size 0, type SPREAD.
pub fn to_spread_placeholder(order: &Order) -> Order {
    let mut placeholder = order.clone();
    placeholder.order_type = OrderType::Spread;
    placeholder.state = OrderState::Virtual;
    placeholder.size = rust_decimal::Decimal::ZERO;
    placeholder.chain_order_id = None;
    placeholder.metadata = Default::default();
    placeholder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OrderId, OrderMetadata};
    use rust_decimal_macros::dec;

    fn order(order_type: OrderType, state: OrderState, has_chain_id: bool) -> Order {
        Order {
            id: OrderId(1),
            chain_order_id: has_chain_id.then(|| crate::core::types::ChainOrderId("c1".into())),
            order_type,
            state,
            price: dec!(100),
            size: dec!(1),
            metadata: OrderMetadata::default(),
        }
    }

    #[test]
    fn spread_cannot_be_active() {
        let o = order(OrderType::Spread, OrderState::Active, true);
        assert!(matches!(
            validate_transition(&o),
            Err(ErrorKind::IllegalTransition { .. })
        ));
    }

    #[test]
    fn spread_cannot_be_partial() {
        let o = order(OrderType::Spread, OrderState::Partial, true);
        assert!(validate_transition(&o).is_err());
    }

    #[test]
    fn spread_virtual_is_fine() {
        let o = order(OrderType::Spread, OrderState::Virtual, false);
        assert!(validate_transition(&o).is_ok());
    }

    #[test]
    fn active_without_chain_id_is_phantom() {
        let o = order(OrderType::Buy, OrderState::Active, false);
        assert!(matches!(
            validate_transition(&o),
            Err(ErrorKind::IllegalTransition { .. })
        ));
    }

    #[test]
    fn partial_without_chain_id_is_phantom() {
        let o = order(OrderType::Sell, OrderState::Partial, false);
        assert!(validate_transition(&o).is_err());
    }

    #[test]
    fn active_with_chain_id_is_legal() {
        let o = order(OrderType::Buy, OrderState::Active, true);
        assert!(validate_transition(&o).is_ok());
    }

    #[test]
    fn virtual_without_chain_id_is_legal() {
        let o = order(OrderType::Buy, OrderState::Virtual, false);
        assert!(validate_transition(&o).is_ok());
    }

    #[test]
    fn downgrade_phantom_clears_chain_id_and_state() {
        let mut o = order(OrderType::Buy, OrderState::Active, false);
        o.chain_order_id = Some(crate::core::types::ChainOrderId("ghost".into()));
        let downgraded = downgrade_phantom(&o);
        assert_eq!(downgraded.state, OrderState::Virtual);
        assert!(downgraded.chain_order_id.is_none());
    }

    #[test]
    fn to_spread_placeholder_zeroes_size_and_metadata() {
        let mut o = order(OrderType::Buy, OrderState::Active, true);
        o.size = dec!(5);
        o.metadata.is_double_order = true;
        let placeholder = to_spread_placeholder(&o);
        assert_eq!(placeholder.order_type, OrderType::Spread);
        assert_eq!(placeholder.state, OrderState::Virtual);
        assert_eq!(placeholder.size, dec!(0));
        assert!(!placeholder.metadata.is_double_order);
        assert!(placeholder.chain_order_id.is_none());
    }
}
