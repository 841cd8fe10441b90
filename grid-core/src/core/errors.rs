//! Low-level error types for conversion and index bookkeeping.
//!
//! Kept in the teacher's hand-rolled `Display`/`Error` style rather than
//! `thiserror` since these sit below the crate's `ErrorKind` taxonomy and
//! are wrapped into it at the boundary (see `crate::errors`).

use std::fmt;

/// Errors raised by the tagged float/blockchain-int conversion module.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// Value is too large or too small to plausibly represent the target
    /// precision.
    OutOfRange { value: f64, precision: u32 },

    /// Value is NaN (never a valid price or size).
    NotANumber,

    /// Value is infinite.
    Infinite { positive: bool },

    /// A value already tagged as a chain integer was passed where a human
    /// amount was expected, or vice versa, without going through the
    /// tagged constructor. Rejected rather than silently coerced.
    DoubleConversion,

    /// Round-trip float -> int -> float drifted by more than the allowed
    /// relative tolerance.
    PrecisionLoss {
        original: f64,
        converted: f64,
        relative_error: f64,
    },
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::OutOfRange { value, precision } => write!(
                f,
                "value {} is implausible for precision {} units",
                value, precision
            ),
            ConversionError::NotANumber => write!(f, "cannot tag NaN as an amount"),
            ConversionError::Infinite { positive } => write!(
                f,
                "cannot tag {} infinity as an amount",
                if *positive { "positive" } else { "negative" }
            ),
            ConversionError::DoubleConversion => {
                write!(f, "value appears already tagged; refusing double conversion")
            }
            ConversionError::PrecisionLoss {
                original,
                converted,
                relative_error,
            } => write!(
                f,
                "precision loss too high: {} -> {} (relative error {:.2e})",
                original, converted, relative_error
            ),
        }
    }
}

impl std::error::Error for ConversionError {}

/// Errors raised by `GridStore::validate_indices` / `repair_indices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// An order id appears in a secondary index but not in the primary map.
    OrphanIndexEntry { index: &'static str },

    /// An order id in the primary map is missing from the index that
    /// should contain it.
    MissingIndexEntry { index: &'static str },

    /// An order id appears in more than one state-set (or type-set).
    DuplicateIndexEntry { index: &'static str },
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::OrphanIndexEntry { index } => {
                write!(f, "orphan entry in index '{}'", index)
            }
            IndexError::MissingIndexEntry { index } => {
                write!(f, "missing entry in index '{}'", index)
            }
            IndexError::DuplicateIndexEntry { index } => {
                write!(f, "duplicate entry in index '{}'", index)
            }
        }
    }
}

impl std::error::Error for IndexError {}
