//! Test fixtures shared across unit and integration tests: a scripted
//! `DexClient`, an in-memory `PersistenceAdapter`, and `Order`/`GridStore`
//! builders.

pub mod helpers;

pub use helpers::*;
