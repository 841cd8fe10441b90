//! Runtime configuration structure.
//!
//! Unlike the teacher's compile-time Cargo-feature configuration (suited
//! to a const-generic hot path with no runtime branches), this engine's
//! tunables are accounting/locking parameters read once at startup and
//! held by `Manager` — ordinary `serde`-derived runtime config, loaded
//! from TOML/JSON the way the teacher's cold-path settings (metrics,
//! monitoring, alerts) were.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dex: DexConfig,
    pub grid: GridConfig,
    pub accounting: AccountingConfig,
    pub locks: LockConfig,
    pub metrics: MetricsConfig,
    pub persistence: PersistenceConfig,
}

/// Connection-level configuration for the DEX the grid trades against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexConfig {
    /// Market id to trade.
    pub market_id: u64,

    /// Asset precision (decimal places) for the base and quote assets,
    /// used by the tagged conversion module and the tolerance formula.
    pub base_precision: u32,
    pub quote_precision: u32,

    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Grid-geometry parameters consumed by the external grid-geometry
/// function (spec.md §6). The core treats these as opaque inputs to that
/// function; it does not compute slot prices itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub start_price: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub increment_percent: f64,
    pub weight_distribution: WeightDistribution,
    pub active_orders: ActiveOrdersTarget,
    pub bot_funds: Decimal,
    pub min_order_size_factor: f64,
    pub min_spread_factor: f64,
    pub target_spread_percent: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum WeightDistribution {
    Uniform,
    Linear,
    Geometric,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActiveOrdersTarget {
    pub buy: usize,
    pub sell: usize,
}

/// Accounting/strategy tunables (spec.md §4.2-§4.4 and §9 open questions,
/// now pinned to config rather than hardcoded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingConfig {
    /// Fraction of ideal size below which a partial is "dust" (e.g. 0.05).
    #[serde(default = "default_dust_threshold_pct")]
    pub dust_threshold_pct: f64,

    /// Merge tolerance: how far a MERGE result may land from `idealSize`
    /// and still be accepted instead of triggering a SPLIT.
    #[serde(default = "default_merge_tolerance_pct")]
    pub merge_tolerance_pct: f64,

    /// Absolute price-tolerance floor (`eps_price`).
    #[serde(default = "default_eps_price")]
    pub eps_price: Decimal,

    /// Relative price-tolerance slack, multiplied by price.
    #[serde(default = "default_relative_slack")]
    pub relative_slack: f64,

    /// Reservation multiplier applied when `deductBtsFees` finds
    /// insufficient `cacheFunds` (spec.md §4.2, "≥4x").
    #[serde(default = "default_fee_reservation_multiplier")]
    pub bts_fee_reservation_multiplier: f64,

    /// Spread-correction under-funded floor factor (spec.md §9 open
    /// question, pinned): skip placement if available < floor_factor *
    /// dust size.
    #[serde(default = "default_spread_skip_floor_factor")]
    pub spread_skip_floor_factor: f64,

    /// Fund invariant tolerance: relative fraction of totalChain (e.g.
    /// 0.001 for 0.1%).
    #[serde(default = "default_invariant_tolerance_pct")]
    pub invariant_tolerance_pct: f64,

    /// Maximum persistence retry attempts (spec.md §4.2, "up to 3").
    #[serde(default = "default_persist_retry_attempts")]
    pub persist_retry_attempts: u32,

    /// Which side's cacheFunds absorbs `btsFeesOwed` in the `available`
    /// formula and `deductBtsFees` (spec.md §3).
    #[serde(default = "default_native_fee_side")]
    pub native_fee_side: crate::core::types::Side,
}

fn default_dust_threshold_pct() -> f64 {
    0.05
}
fn default_merge_tolerance_pct() -> f64 {
    0.10
}
fn default_eps_price() -> Decimal {
    Decimal::new(1, 8)
}
fn default_relative_slack() -> f64 {
    0.0005
}
fn default_fee_reservation_multiplier() -> f64 {
    4.0
}
fn default_spread_skip_floor_factor() -> f64 {
    2.0
}
fn default_invariant_tolerance_pct() -> f64 {
    0.001
}
fn default_persist_retry_attempts() -> u32 {
    3
}
fn default_native_fee_side() -> crate::core::types::Side {
    crate::core::types::Side::Sell
}

/// Lock-registry timeouts (spec.md §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    #[serde(default = "default_pipeline_timeout_ms")]
    pub pipeline_timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    30_000
}
fn default_pipeline_timeout_ms() -> u64 {
    60_000
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            pipeline_timeout_ms: default_pipeline_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,

    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,

    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub json_logs: bool,
}

fn default_prometheus_port() -> u16 {
    9090
}
fn default_metrics_addr() -> String {
    "127.0.0.1:9090".to_string()
}
fn default_metrics_path() -> String {
    "/metrics".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            prometheus_port: default_prometheus_port(),
            metrics_addr: default_metrics_addr(),
            metrics_path: default_metrics_path(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_journal_path")]
    pub journal_path: PathBuf,

    #[serde(default = "default_true")]
    pub recover_on_startup: bool,

    #[serde(default = "default_true")]
    pub validate_recovery: bool,
}

fn default_journal_path() -> PathBuf {
    PathBuf::from("./data/grid_execution.jsonl")
}
fn default_true() -> bool {
    true
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            journal_path: default_journal_path(),
            recover_on_startup: true,
            validate_recovery: true,
        }
    }
}
