//! Configuration.
//!
//! Unlike the teacher's two-tier compile-time/runtime split (justified
//! there by a hot path that needed full const propagation), this engine
//! has no comparable hot loop: a sync cycle runs a handful of times per
//! second at most, so every tunable here is ordinary runtime config,
//! loaded from a TOML file with environment-variable overrides.
//!
//! ## Loading
//!
//! ```no_run
//! use grid_core::config::Config;
//!
//! let config = Config::load("config/production.toml")?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Precedence
//!
//! 1. Struct defaults (`#[serde(default = "fn")]`)
//! 2. TOML file
//! 3. Environment variables, `GRID_` prefix, `__` nested-field separator
//!    (e.g. `GRID_METRICS__LOG_LEVEL=debug`)
//!
//! ## Profiles
//!
//! See [`ConfigProfile`] for pre-built development/staging/production
//! configuration sets.

pub mod profiles;
pub mod types;

pub use profiles::{ConfigProfile, ProfileName};
pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a TOML file, with `GRID_`-prefixed
    /// environment variable overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut cfg: Config =
            toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from the default location (`./config/default.toml`).
    pub fn load_default() -> Result<Self> {
        Self::load("config/default.toml")
    }

    /// Apply `GRID_SECTION__FIELD`-style environment overrides for the
    /// handful of fields operators most commonly need to flip without
    /// editing the file (log level, metrics bind address, market id).
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GRID_METRICS__LOG_LEVEL") {
            self.metrics.log_level = v;
        }
        if let Ok(v) = std::env::var("GRID_METRICS__METRICS_ADDR") {
            self.metrics.metrics_addr = v;
        }
        if let Ok(v) = std::env::var("GRID_DEX__MARKET_ID") {
            if let Ok(id) = v.parse() {
                self.dex.market_id = id;
            }
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.grid.min_price <= rust_decimal::Decimal::ZERO {
            anyhow::bail!("grid.min_price must be positive");
        }
        if self.grid.max_price <= self.grid.min_price {
            anyhow::bail!("grid.max_price must exceed grid.min_price");
        }
        if self.grid.start_price < self.grid.min_price || self.grid.start_price > self.grid.max_price
        {
            anyhow::bail!("grid.start_price must lie within [min_price, max_price]");
        }
        if self.grid.increment_percent <= 0.0 {
            anyhow::bail!("grid.increment_percent must be positive");
        }
        if self.grid.bot_funds <= rust_decimal::Decimal::ZERO {
            anyhow::bail!("grid.bot_funds must be positive");
        }
        if self.grid.active_orders.buy == 0 && self.grid.active_orders.sell == 0 {
            anyhow::bail!("grid.active_orders must target at least one side");
        }

        if !(0.0..1.0).contains(&self.accounting.dust_threshold_pct) {
            anyhow::bail!("accounting.dust_threshold_pct must be in [0, 1)");
        }
        if self.accounting.bts_fee_reservation_multiplier < 1.0 {
            anyhow::bail!("accounting.bts_fee_reservation_multiplier must be >= 1.0");
        }
        if self.accounting.invariant_tolerance_pct <= 0.0 {
            anyhow::bail!("accounting.invariant_tolerance_pct must be positive");
        }

        if self.locks.lock_timeout_ms == 0 {
            anyhow::bail!("locks.lock_timeout_ms must be positive");
        }
        if self.locks.pipeline_timeout_ms < self.locks.lock_timeout_ms {
            anyhow::bail!("locks.pipeline_timeout_ms must be >= locks.lock_timeout_ms");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.metrics.log_level.as_str()) {
            anyhow::bail!(
                "invalid log level '{}', must be one of: {:?}",
                self.metrics.log_level,
                valid_log_levels
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_profile_passes_validation() {
        assert!(ConfigProfile::development().validate().is_ok());
        assert!(ConfigProfile::staging().validate().is_ok());
        assert!(ConfigProfile::production().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_price_bounds() {
        let mut cfg = ConfigProfile::development();
        cfg.grid.max_price = cfg.grid.min_price;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_active_orders_both_sides() {
        let mut cfg = ConfigProfile::development();
        cfg.grid.active_orders.buy = 0;
        cfg.grid.active_orders.sell = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_log_level() {
        let mut cfg = ConfigProfile::development();
        cfg.metrics.log_level = "verbose".to_string();
        assert!(cfg.validate().is_err());
    }
}
