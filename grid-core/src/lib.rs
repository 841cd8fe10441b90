//! Grid Core - grid market-making engine for a DEX with on-chain limit orders
//!
//! The engine keeps a ladder of BUY/SELL/SPREAD slots (the "grid"), each in
//! one of three states (VIRTUAL/ACTIVE/PARTIAL), and drives it through one
//! logical cycle per chain event: read chain state → reconcile into the
//! Grid Store → recompute fund totals → generate a strategy plan → broadcast
//! → persist. Every mutation path is runtime-validated rather than relying
//! on a compile-time typestate, since phantom orders and illegal
//! transitions are recoverable conditions the engine must detect and log,
//! not states the type system can rule out up front.
//!
//! ## Core modules
//! - `core`: order types and the state-machine transition table
//! - `units`: tagged human/chain amount conversion
//! - `errors`: the error-kind taxonomy (spec.md §7)
//! - `store`: the Grid Store and its by-state/by-type indices
//! - `accounting`: the six-accumulator fund model and invariant checks
//! - `sync`: chain reconciliation (two-pass matching, Anchor-and-Refill)
//! - `strategy`: action-plan generation (create/cancel/update/rotate)
//! - `manager`: the named-lock registry, shadow locks, pipeline health
//! - `interfaces`: the `DexClient`/`PersistenceAdapter`/`GridGeometry` contracts
//! - `persistence`: the crash-recovery journal, a concrete `PersistenceAdapter`
//! - `config`: profile-based configuration loading and validation
//! - `resilience`: exponential backoff for transient failures
//! - `monitoring`: Prometheus metrics and the `getMetrics()` snapshot
//! - `testing`: fixtures shared by unit and integration tests

pub mod accounting;
pub mod config;
pub mod core;
pub mod errors;
pub mod interfaces;
pub mod manager;
pub mod monitoring;
pub mod persistence;
pub mod resilience;
pub mod store;
pub mod strategy;
pub mod sync;
pub mod testing;
pub mod units;
pub mod utils;

pub use core::{ChainOrderId, Order, OrderId, OrderMetadata, OrderState, OrderType, Side};
pub use errors::ErrorKind;
pub use store::GridStore;
pub use units::{ChainAmount, HumanAmount};

pub use anyhow::{Error, Result};

/// Convenient imports for binaries wiring the engine together.
pub mod prelude {
    pub use crate::accounting::Accountant;
    pub use crate::config::Config;
    pub use crate::core::{ChainOrderId, Order, OrderId, OrderState, OrderType, Side};
    pub use crate::errors::ErrorKind;
    pub use crate::interfaces::{DexClient, GridGeometry, PersistenceAdapter};
    pub use crate::manager::{LockRegistry, Manager};
    pub use crate::persistence::FileJournal;
    pub use crate::store::GridStore;
    pub use crate::strategy::StrategyEngine;
    pub use crate::sync::SyncEngine;
    pub use crate::units::{ChainAmount, HumanAmount};
    pub use crate::{Error, Result};
}
