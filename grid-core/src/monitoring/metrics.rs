//! Prometheus metrics for the grid engine (spec.md §6 "Observability
//! (produced)"): `getMetrics()`'s six counters/gauges plus per-lock
//! wait-time histograms, grounded on the teacher's `MetricsRegistry`
//! (same `Registry`-holding-`Arc`-of-metric-groups shape, renamed from
//! trading/performance/risk/system groups to the one group this engine
//! actually needs).

use prometheus::{Gauge, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;
use tracing::info;

/// Central registry for all Prometheus metrics the grid engine exports.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    grid: Arc<GridMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());
        let grid = Arc::new(GridMetrics::new(&registry)?);

        info!("Prometheus metrics registry initialized");

        Ok(Self { registry, grid })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn grid(&self) -> &GridMetrics {
        &self.grid
    }
}

impl Default for MetricsRegistry {
    #[allow(clippy::panic)]
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            tracing::error!("FATAL: failed to create metrics registry: {}", e);
            panic!("cannot create metrics registry")
        })
    }
}

/// The fields of spec.md §6's `getMetrics()`, plus per-lock wait-time
/// histograms (named in spec.md §5's lock table) that the JSON snapshot
/// doesn't carry but Prometheus scraping benefits from.
pub struct GridMetrics {
    /// `fundRecalcCount`: total `Accountant::recalculate` calls.
    pub fund_recalc_total: IntCounter,
    /// `invariantViolations.{buy,sell}`.
    pub invariant_violations_total: IntCounterVec,
    /// `lockAcquisitions`.
    pub lock_acquisitions_total: IntCounter,
    /// `lockContentionSkips`.
    pub lock_contention_skips_total: IntCounter,
    /// `lastSyncDurationMs`, reported as a gauge (most recent value) since
    /// `getMetrics()` wants a point-in-time read, not a distribution.
    pub last_sync_duration_ms: Gauge,
    /// `uptimeMs`.
    pub uptime_ms: Gauge,
    /// Per-lock wait time, labeled by lock name from spec.md §5's table.
    pub lock_wait_seconds: HistogramVec,
    /// Persistence retry attempts consumed before success or final failure.
    pub persist_retry_attempts: Histogram,
}

impl GridMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let fund_recalc_total = IntCounter::with_opts(
            Opts::new("fund_recalc_total", "Total Accountant recalculation calls").namespace("grid"),
        )?;
        registry.register(Box::new(fund_recalc_total.clone()))?;

        let invariant_violations_total = IntCounterVec::new(
            Opts::new("invariant_violations_total", "Fund invariant violations by side").namespace("grid"),
            &["side"],
        )?;
        registry.register(Box::new(invariant_violations_total.clone()))?;

        let lock_acquisitions_total = IntCounter::with_opts(
            Opts::new("lock_acquisitions_total", "Total named-lock acquisitions").namespace("grid"),
        )?;
        registry.register(Box::new(lock_acquisitions_total.clone()))?;

        let lock_contention_skips_total = IntCounter::with_opts(
            Opts::new(
                "lock_contention_skips_total",
                "Operations skipped due to a held shadow lock",
            )
            .namespace("grid"),
        )?;
        registry.register(Box::new(lock_contention_skips_total.clone()))?;

        let last_sync_duration_ms =
            Gauge::with_opts(Opts::new("last_sync_duration_ms", "Duration of the most recent chain sync").namespace("grid"))?;
        registry.register(Box::new(last_sync_duration_ms.clone()))?;

        let uptime_ms = Gauge::with_opts(Opts::new("uptime_ms", "Process uptime in milliseconds").namespace("grid"))?;
        registry.register(Box::new(uptime_ms.clone()))?;

        let lock_wait_seconds = HistogramVec::new(
            HistogramOpts::new("lock_wait_seconds", "Time spent waiting to acquire a named lock")
                .namespace("grid")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["lock"],
        )?;
        registry.register(Box::new(lock_wait_seconds.clone()))?;

        let persist_retry_attempts = Histogram::with_opts(
            HistogramOpts::new("persist_retry_attempts", "Attempts consumed per persistence write")
                .namespace("grid")
                .buckets(vec![1.0, 2.0, 3.0, 4.0]),
        )?;
        registry.register(Box::new(persist_retry_attempts.clone()))?;

        Ok(Self {
            fund_recalc_total,
            invariant_violations_total,
            lock_acquisitions_total,
            lock_contention_skips_total,
            last_sync_duration_ms,
            uptime_ms,
            lock_wait_seconds,
            persist_retry_attempts,
        })
    }
}

/// The JSON-friendly snapshot named by spec.md §6: `getMetrics()`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub fund_recalc_count: u64,
    pub invariant_violations_buy: u64,
    pub invariant_violations_sell: u64,
    pub lock_acquisitions: u64,
    pub lock_contention_skips: u64,
    pub last_sync_duration_ms: f64,
    pub uptime_ms: u64,
    pub fund_recalc_per_minute: f64,
}

impl MetricsRegistry {
    /// `getMetrics()`: reads the live gauges/counters back into the plain
    /// struct external callers (and tests) consume, computing
    /// `fundRecalcPerMinute` from the process uptime.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let grid = self.grid();
        let uptime_ms = grid.uptime_ms.get().max(0.0) as u64;
        let fund_recalc_count = grid.fund_recalc_total.get();
        let fund_recalc_per_minute = if uptime_ms == 0 {
            0.0
        } else {
            fund_recalc_count as f64 * 60_000.0 / uptime_ms as f64
        };

        MetricsSnapshot {
            fund_recalc_count,
            invariant_violations_buy: grid
                .invariant_violations_total
                .with_label_values(&["buy"])
                .get(),
            invariant_violations_sell: grid
                .invariant_violations_total
                .with_label_values(&["sell"])
                .get(),
            lock_acquisitions: grid.lock_acquisitions_total.get(),
            lock_contention_skips: grid.lock_contention_skips_total.get(),
            last_sync_duration_ms: grid.last_sync_duration_ms.get(),
            uptime_ms,
            fund_recalc_per_minute,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_registers_all_grid_metrics() {
        let registry = MetricsRegistry::new().unwrap();
        assert!(!registry.registry().gather().is_empty());
    }

    #[test]
    fn snapshot_reports_incremented_counters() {
        let registry = MetricsRegistry::new().unwrap();
        registry.grid().fund_recalc_total.inc();
        registry.grid().fund_recalc_total.inc();
        registry
            .grid()
            .invariant_violations_total
            .with_label_values(&["buy"])
            .inc();
        registry.grid().uptime_ms.set(60_000.0);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.fund_recalc_count, 2);
        assert_eq!(snapshot.invariant_violations_buy, 1);
        assert_eq!(snapshot.invariant_violations_sell, 0);
        assert_eq!(snapshot.fund_recalc_per_minute, 2.0);
    }

    #[test]
    fn snapshot_handles_zero_uptime_without_dividing_by_zero() {
        let registry = MetricsRegistry::new().unwrap();
        registry.grid().fund_recalc_total.inc();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.fund_recalc_per_minute, 0.0);
    }

    #[test]
    fn lock_wait_histogram_accepts_per_lock_labels() {
        let registry = MetricsRegistry::new().unwrap();
        registry
            .grid()
            .lock_wait_seconds
            .with_label_values(&["gridLock"])
            .observe(0.002);
        let families = registry.registry().gather();
        assert!(families.iter().any(|f| f.get_name() == "grid_lock_wait_seconds"));
    }
}
