//! Configuration profiles for different environments.
//!
//! - Development: relaxed thresholds, debug logging, in-repo data paths.
//! - Staging: production-shaped limits at reduced scale.
//! - Production: strict thresholds, warn-level logging, `/var/lib` paths.

use super::types::*;
use rust_decimal_macros::dec;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileName {
    Development,
    Staging,
    Production,
}

impl ProfileName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Some(Self::Development),
            "staging" | "stage" => Some(Self::Staging),
            "prod" | "production" => Some(Self::Production),
            _ => None,
        }
    }
}

pub struct ConfigProfile;

impl ConfigProfile {
    /// Small grid, verbose logging, no startup recovery (clean slate each run).
    pub fn development() -> Config {
        Config {
            dex: DexConfig {
                market_id: 1,
                base_precision: 8,
                quote_precision: 8,
                endpoint: None,
            },
            grid: GridConfig {
                start_price: dec!(100),
                min_price: dec!(80),
                max_price: dec!(120),
                increment_percent: 1.0,
                weight_distribution: WeightDistribution::Uniform,
                active_orders: ActiveOrdersTarget { buy: 5, sell: 5 },
                bot_funds: dec!(10),
                min_order_size_factor: 0.5,
                min_spread_factor: 1.0,
                target_spread_percent: 1.0,
            },
            accounting: AccountingConfig {
                dust_threshold_pct: 0.05,
                merge_tolerance_pct: 0.10,
                eps_price: rust_decimal::Decimal::new(1, 8),
                relative_slack: 0.0005,
                bts_fee_reservation_multiplier: 4.0,
                spread_skip_floor_factor: 2.0,
                invariant_tolerance_pct: 0.001,
                persist_retry_attempts: 3,
            },
            locks: LockConfig {
                lock_timeout_ms: 30_000,
                pipeline_timeout_ms: 60_000,
            },
            metrics: MetricsConfig {
                prometheus_port: 9090,
                metrics_addr: "127.0.0.1:9090".to_string(),
                metrics_path: "/metrics".to_string(),
                log_level: "debug".to_string(),
                json_logs: false,
            },
            persistence: PersistenceConfig {
                journal_path: PathBuf::from("./dev-data/grid_execution.jsonl"),
                recover_on_startup: false,
                validate_recovery: true,
            },
        }
    }

    /// Production-shaped limits at reduced scale, externally reachable metrics.
    pub fn staging() -> Config {
        Config {
            dex: DexConfig {
                market_id: 1,
                base_precision: 8,
                quote_precision: 8,
                endpoint: None,
            },
            grid: GridConfig {
                start_price: dec!(100),
                min_price: dec!(50),
                max_price: dec!(150),
                increment_percent: 0.5,
                weight_distribution: WeightDistribution::Linear,
                active_orders: ActiveOrdersTarget { buy: 15, sell: 15 },
                bot_funds: dec!(500),
                min_order_size_factor: 0.5,
                min_spread_factor: 1.0,
                target_spread_percent: 0.5,
            },
            accounting: AccountingConfig {
                dust_threshold_pct: 0.05,
                merge_tolerance_pct: 0.10,
                eps_price: rust_decimal::Decimal::new(1, 8),
                relative_slack: 0.0005,
                bts_fee_reservation_multiplier: 4.0,
                spread_skip_floor_factor: 2.0,
                invariant_tolerance_pct: 0.001,
                persist_retry_attempts: 3,
            },
            locks: LockConfig {
                lock_timeout_ms: 30_000,
                pipeline_timeout_ms: 60_000,
            },
            metrics: MetricsConfig {
                prometheus_port: 9090,
                metrics_addr: "0.0.0.0:9090".to_string(),
                metrics_path: "/metrics".to_string(),
                log_level: "info".to_string(),
                json_logs: true,
            },
            persistence: PersistenceConfig {
                journal_path: PathBuf::from("./staging-data/grid_execution.jsonl"),
                recover_on_startup: true,
                validate_recovery: true,
            },
        }
    }

    /// Strict thresholds, warn-level logging, recovery mandatory.
    pub fn production() -> Config {
        Config {
            dex: DexConfig {
                market_id: 1,
                base_precision: 8,
                quote_precision: 8,
                endpoint: None,
            },
            grid: GridConfig {
                start_price: dec!(100),
                min_price: dec!(30),
                max_price: dec!(300),
                increment_percent: 0.25,
                weight_distribution: WeightDistribution::Geometric,
                active_orders: ActiveOrdersTarget { buy: 30, sell: 30 },
                bot_funds: dec!(10000),
                min_order_size_factor: 0.5,
                min_spread_factor: 1.0,
                target_spread_percent: 0.25,
            },
            accounting: AccountingConfig {
                dust_threshold_pct: 0.03,
                merge_tolerance_pct: 0.08,
                eps_price: rust_decimal::Decimal::new(1, 8),
                relative_slack: 0.0005,
                bts_fee_reservation_multiplier: 4.0,
                spread_skip_floor_factor: 2.0,
                invariant_tolerance_pct: 0.0005,
                persist_retry_attempts: 3,
            },
            locks: LockConfig {
                lock_timeout_ms: 30_000,
                pipeline_timeout_ms: 60_000,
            },
            metrics: MetricsConfig {
                prometheus_port: 9090,
                metrics_addr: "0.0.0.0:9090".to_string(),
                metrics_path: "/metrics".to_string(),
                log_level: "warn".to_string(),
                json_logs: true,
            },
            persistence: PersistenceConfig {
                journal_path: PathBuf::from("/var/lib/grid-bot/grid_execution.jsonl"),
                recover_on_startup: true,
                validate_recovery: true,
            },
        }
    }

    pub fn load(profile: ProfileName) -> Config {
        match profile {
            ProfileName::Development => Self::development(),
            ProfileName::Staging => Self::staging(),
            ProfileName::Production => Self::production(),
        }
    }

    /// Load profile by `GRID_PROFILE` env var, defaulting to development.
    pub fn from_env() -> Config {
        let profile = std::env::var("GRID_PROFILE")
            .ok()
            .and_then(|s| ProfileName::from_str(&s))
            .unwrap_or(ProfileName::Development);
        Self::load(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_name_round_trips() {
        assert_eq!(ProfileName::from_str("dev"), Some(ProfileName::Development));
        assert_eq!(
            ProfileName::from_str("production"),
            Some(ProfileName::Production)
        );
        assert_eq!(ProfileName::from_str("bogus"), None);
    }

    #[test]
    fn development_profile_is_conservative_and_valid() {
        let config = ConfigProfile::development();
        assert_eq!(config.metrics.log_level, "debug");
        assert!(!config.persistence.recover_on_startup);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn production_profile_recovers_on_startup() {
        let config = ConfigProfile::production();
        assert_eq!(config.metrics.log_level, "warn");
        assert!(config.persistence.recover_on_startup);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn all_profiles_validate() {
        assert!(ConfigProfile::development().validate().is_ok());
        assert!(ConfigProfile::staging().validate().is_ok());
        assert!(ConfigProfile::production().validate().is_ok());
    }
}
