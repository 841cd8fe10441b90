//! The seven error kinds of the grid engine (behavior, not exception
//! hierarchy). `Accountant` and `StrategyEngine` absorb every variant
//! internally except an unrepairable `IndexCorruption`; only `Manager` may
//! turn an `Err` into an aborted cycle, and it does so by skipping
//! broadcast, never by unwinding.

use crate::core::errors::{ConversionError, IndexError};
use crate::core::types::Side;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Rejected mutation: phantom order, SPREAD going on-chain, or an
    /// update with a missing/null id. Logged; mutation discarded or
    /// auto-downgraded; never fatal.
    #[error("illegal transition rejected: {reason}")]
    IllegalTransition { reason: String },

    /// Blockchain-int passed where a human float was expected, or a
    /// suspicious magnitude. Fatal within the conversion call itself; the
    /// caller decides how to handle it.
    #[error("type mismatch in tagged conversion: {0}")]
    TypeMismatch(#[from] ConversionError),

    /// Fund drift beyond tolerance outside the bootstrap phase. Logged at
    /// warn; blocks persistence; does not abort the cycle.
    #[error("invariant violation on {side}: drift {drift} exceeds allowed {allowed}")]
    InvariantViolation {
        side: Side,
        drift: rust_decimal::Decimal,
        allowed: rust_decimal::Decimal,
    },

    /// Transient chain RPC failure. Retried by the RPC layer; if escalated,
    /// treated as "no information this cycle".
    #[error("chain RPC call failed: {0}")]
    ChainRpcFailure(#[source] anyhow::Error),

    /// Persistence write failed after exhausting retries. Sets
    /// `persistence_warning`; never propagated further.
    #[error("persistence failed after {attempts} attempts: {source}")]
    PersistenceFailure {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// `validate_indices()` found a structural inconsistency that
    /// `repair_indices()` could not fix. The only `ErrorKind` that may
    /// abort a cycle outright.
    #[error("index corruption: {0}")]
    IndexCorruption(#[from] IndexError),

    /// A pipeline operation (correction, divergence flag, shadow lock)
    /// exceeded its timeout and was forcibly cleared.
    #[error("pipeline operation '{operation}' timed out after {elapsed_ms}ms")]
    PipelineTimeout { operation: String, elapsed_ms: u64 },
}

impl ErrorKind {
    /// Per spec.md §7: only `IndexCorruption` (and only when repair also
    /// fails) may legitimately abort a cycle. Everything else is meant to
    /// be absorbed by the component that produced it.
    pub fn is_cycle_aborting(&self) -> bool {
        matches!(self, ErrorKind::IndexCorruption(_))
    }
}
