//! Tagged float/blockchain-int conversion (spec.md §6).
//!
//! Chain amounts are integers in the asset's smallest unit; human amounts
//! are decimals. A bare `f64`/`i128` is easy to feed to the wrong side of
//! that boundary by accident (passing raw chain units into a price field,
//! or a human amount into a transfer call) — these newtypes make that a
//! type error instead of a silent bug: there is no `From`/`Into` between
//! `HumanAmount` and `ChainAmount` that skips the precision argument, and
//! the constructors reject magnitudes implausible for the stated
//! precision.
//!
//! Generalizes the teacher's single-sided `core::fixed_point` tagging to
//! the two-sided human/chain tagging this spec requires.

use crate::core::errors::ConversionError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// A value already known to be in human (display) units, e.g. an order
/// price or size as the strategy reasons about it.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct HumanAmount(f64);

/// A value already known to be in the asset's smallest on-chain unit, as
/// returned by `read_open_orders`/`subscribe_fills`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord)]
pub struct ChainAmount(i128);

/// Above this many implied whole units, a value is almost certainly
/// untagged chain-integer data masquerading as human units (or vice
/// versa). Not a hard protocol limit, just a sanity backstop.
const IMPLAUSIBLE_HUMAN_MAGNITUDE: f64 = 1e15;

impl HumanAmount {
    /// Tag a raw float as human units. Rejected if NaN, infinite, or
    /// implausibly large for any precision the protocol would plausibly
    /// use (a guard against feeding in an untagged chain integer).
    pub fn tag(value: f64) -> Result<Self, ConversionError> {
        if value.is_nan() {
            return Err(ConversionError::NotANumber);
        }
        if value.is_infinite() {
            return Err(ConversionError::Infinite {
                positive: value.is_sign_positive(),
            });
        }
        if value.abs() > IMPLAUSIBLE_HUMAN_MAGNITUDE {
            return Err(ConversionError::OutOfRange {
                value,
                precision: 0,
            });
        }
        Ok(Self(value))
    }

    /// Convert a chain integer to human units given the asset's decimal
    /// precision. The only legitimate way to produce a `HumanAmount` from
    /// chain data.
    pub fn from_chain(chain: ChainAmount, precision: u32) -> Result<Self, ConversionError> {
        let scale = 10f64.powi(precision as i32);
        let value = chain.0 as f64 / scale;
        Self::tag(value)
    }

    pub fn get(self) -> f64 {
        self.0
    }

    pub fn as_decimal(self) -> Decimal {
        Decimal::try_from(self.0).unwrap_or(Decimal::ZERO)
    }
}

impl ChainAmount {
    pub fn new(raw: i128) -> Self {
        Self(raw)
    }

    pub fn get(self) -> i128 {
        self.0
    }

    /// Convert a human amount to a chain integer given the asset's decimal
    /// precision. Rounds to the nearest integer unit (spec.md §4.3 uses
    /// this for "integer compare, not float" size reconciliation).
    pub fn from_human(human: HumanAmount, precision: u32) -> Result<Self, ConversionError> {
        let scale = 10f64.powi(precision as i32);
        let scaled = human.get() * scale;
        if scaled.is_nan() {
            return Err(ConversionError::NotANumber);
        }
        if scaled.abs() > i128::MAX as f64 {
            return Err(ConversionError::OutOfRange {
                value: human.get(),
                precision,
            });
        }
        Ok(Self(scaled.round() as i128))
    }
}

/// Round-trip a human amount through chain-integer precision and back,
/// verifying the drift stays within `10^-10` relative (spec.md §8,
/// property 10).
pub fn round_trip_check(human: HumanAmount, precision: u32) -> Result<(), ConversionError> {
    let chain = ChainAmount::from_human(human, precision)?;
    let back = HumanAmount::from_chain(chain, precision)?;
    let relative_error = if human.get() == 0.0 {
        (back.get() - human.get()).abs()
    } else {
        ((back.get() - human.get()) / human.get()).abs()
    };
    if relative_error > 1e-10 {
        return Err(ConversionError::PrecisionLoss {
            original: human.get(),
            converted: back.get(),
            relative_error,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn rejects_nan() {
        assert!(matches!(
            HumanAmount::tag(f64::NAN),
            Err(ConversionError::NotANumber)
        ));
    }

    #[test]
    fn rejects_infinite() {
        assert!(matches!(
            HumanAmount::tag(f64::INFINITY),
            Err(ConversionError::Infinite { positive: true })
        ));
    }

    #[test]
    fn rejects_implausible_magnitude() {
        assert!(HumanAmount::tag(1e20).is_err());
    }

    #[test]
    fn chain_to_human_round_trip() {
        let chain = ChainAmount::new(123_456_789);
        let human = HumanAmount::from_chain(chain, 6).unwrap();
        assert_relative_eq!(human.get(), 123.456789, epsilon = 1e-9);
        let back = ChainAmount::from_human(human, 6).unwrap();
        assert_eq!(back.get(), chain.get());
    }

    proptest! {
        #[test]
        fn round_trip_preserves_value(raw in -1_000_000_000i64..1_000_000_000i64, precision in 0u32..12) {
            let chain = ChainAmount::new(raw as i128);
            if let Ok(human) = HumanAmount::from_chain(chain, precision) {
                prop_assert!(round_trip_check(human, precision).is_ok());
            }
        }
    }
}
