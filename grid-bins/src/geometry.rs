//! A concrete `GridGeometry` implementation. The core treats grid
//! geometry as an opaque consumed interface (spec.md §6); this is the
//! reference implementation the binaries wire in, derived from
//! `GridConfig`.

use grid_core::config::{ActiveOrdersTarget, GridConfig, WeightDistribution};
use grid_core::core::types::Side;
use grid_core::interfaces::GridGeometry;
use grid_core::units::HumanAmount;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub struct ConfiguredGeometry {
    min_price: Decimal,
    max_price: Decimal,
    increment_percent: f64,
    weight_distribution: WeightDistribution,
    active_orders: ActiveOrdersTarget,
    bot_funds: Decimal,
}

impl ConfiguredGeometry {
    pub fn new(config: &GridConfig) -> Self {
        Self {
            min_price: config.min_price,
            max_price: config.max_price,
            increment_percent: config.increment_percent,
            weight_distribution: config.weight_distribution,
            active_orders: config.active_orders,
            bot_funds: config.bot_funds,
        }
    }

    fn weight(&self, index: i64) -> f64 {
        match self.weight_distribution {
            WeightDistribution::Uniform => 1.0,
            WeightDistribution::Linear => 1.0 + index.unsigned_abs() as f64 * 0.1,
            WeightDistribution::Geometric => 1.1f64.powi(index.unsigned_abs() as i32 % 32),
        }
    }
}

impl GridGeometry for ConfiguredGeometry {
    fn slot_price(&self, index: i64) -> Decimal {
        let factor = (1.0 + self.increment_percent / 100.0).powi(index as i32);
        let factor = Decimal::try_from(factor).unwrap_or(Decimal::ONE);
        (self.min_price * factor).clamp(self.min_price, self.max_price)
    }

    fn ideal_size(&self, side: Side, price: Decimal) -> HumanAmount {
        let slots = match side {
            Side::Buy => self.active_orders.buy.max(1),
            Side::Sell => self.active_orders.sell.max(1),
        };
        let per_slot_funds = self.bot_funds / Decimal::from(slots as u64);
        let weighted = per_slot_funds * Decimal::try_from(self.weight(0)).unwrap_or(Decimal::ONE);
        let price_f64 = price.to_f64().unwrap_or(1.0).max(1e-12);
        let size = weighted.to_f64().unwrap_or(0.0) / price_f64;
        HumanAmount::tag(size).unwrap_or(HumanAmount::tag(0.0).unwrap())
    }
}
