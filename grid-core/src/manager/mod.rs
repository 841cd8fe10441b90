//! Manager / Orchestrator (spec.md §4.5, component E): owns the named
//! lock registry (spec.md §5), lifecycle flags, the shadow-lock map, and
//! the pipeline-health tracker. The only component permitted to call the
//! DEX broadcast interface and to gate persistence.

use crate::core::types::OrderId;
use crate::errors::ErrorKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard, Semaphore, SemaphorePermit};

/// The eight named locks (spec.md §5). Each guards a distinct concern;
/// acquisition is FIFO-fair via `tokio::sync::Mutex`/`Semaphore`, which
/// queue waiters in arrival order.
pub struct LockRegistry {
    pub grid_lock: Mutex<()>,
    pub sync_lock: Mutex<()>,
    pub fill_processing_lock: Mutex<()>,
    pub divergence_lock: Mutex<()>,
    pub account_totals_lock: Mutex<()>,
    pub funds_semaphore: Semaphore,
    pub spread_count_lock: Mutex<()>,
    pub corrections_lock: Mutex<()>,

    acquisitions: AtomicU64,
    contention_skips: AtomicU64,
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self {
            grid_lock: Mutex::new(()),
            sync_lock: Mutex::new(()),
            fill_processing_lock: Mutex::new(()),
            divergence_lock: Mutex::new(()),
            account_totals_lock: Mutex::new(()),
            funds_semaphore: Semaphore::new(1),
            spread_count_lock: Mutex::new(()),
            corrections_lock: Mutex::new(()),
            acquisitions: AtomicU64::new(0),
            contention_skips: AtomicU64::new(0),
        }
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire_grid_lock(&self) -> MutexGuard<'_, ()> {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.grid_lock.lock().await
    }

    pub async fn acquire_sync_lock(&self) -> MutexGuard<'_, ()> {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.sync_lock.lock().await
    }

    pub async fn acquire_funds_permit(&self) -> SemaphorePermit<'_> {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.funds_semaphore
            .acquire()
            .await
            .expect("funds_semaphore is never closed")
    }

    /// `waitForAccountTotals(timeout)` (spec.md §5): the promise must be
    /// created *inside* `accountTotalsLock` and awaited *inside* the same
    /// lock — creating outside and awaiting outside is an observable bug
    /// this signature makes impossible to reproduce, since the guard
    /// lives for the whole `wait` duration.
    pub async fn wait_for_account_totals<F, Fut>(
        &self,
        timeout: Duration,
        wait_fn: F,
    ) -> Result<(), ErrorKind>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let _guard = self.account_totals_lock.lock().await;
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        match tokio::time::timeout(timeout, wait_fn()).await {
            Ok(()) => Ok(()),
            Err(_) => Err(ErrorKind::PipelineTimeout {
                operation: "waitForAccountTotals".to_string(),
                elapsed_ms: timeout.as_millis() as u64,
            }),
        }
    }

    pub fn record_contention_skip(&self) {
        self.contention_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    pub fn contention_skips(&self) -> u64 {
        self.contention_skips.load(Ordering::Relaxed)
    }
}

/// Which caller triggered `synchronizeWithChain`, determining whether
/// `gridLock` is acquired here or already held by the Sync Engine's
/// `syncLock` (spec.md §5 "Lock routing"). Misrouting a source is a
/// deadlock, so routing is pinned by this enum rather than inferred from
/// call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSource {
    CreateOrder,
    CancelOrder,
    Custom,
    ReadOpenOrders,
    PeriodicBlockchainFetch,
}

impl SyncSource {
    /// `true` if this source must acquire `gridLock` directly; `false` if
    /// it instead funnels through `syncLock` at the Sync Engine layer and
    /// must NOT also take `gridLock` (that would deadlock against a
    /// concurrent point event).
    pub fn acquires_grid_lock(self) -> bool {
        matches!(self, SyncSource::CreateOrder | SyncSource::CancelOrder | SyncSource::Custom)
    }
}

/// A self-expiring per-order lock (spec.md §5 "shadow lock"). Entries
/// expire after `lock_timeout` so a crashed holder cannot indefinitely
/// block a slot (spec.md §8 property 8).
#[derive(Debug, Default)]
pub struct ShadowLockMap {
    locked: HashMap<OrderId, Instant>,
    lock_timeout: Option<Duration>,
}

impl ShadowLockMap {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            locked: HashMap::new(),
            lock_timeout: Some(lock_timeout),
        }
    }

    pub fn lock(&mut self, id: OrderId) {
        self.locked.insert(id, Instant::now());
    }

    pub fn unlock(&mut self, id: OrderId) {
        self.locked.remove(&id);
    }

    /// Expired entries read as unlocked without an explicit sweep —
    /// self-healing on the read path, the way the teacher's TTL caches
    /// check expiry lazily rather than running a background reaper.
    pub fn is_locked(&self, id: OrderId) -> bool {
        match self.locked.get(&id) {
            None => false,
            Some(acquired_at) => match self.lock_timeout {
                Some(timeout) => acquired_at.elapsed() < timeout,
                None => true,
            },
        }
    }

    /// Drop entries that have actually expired, for memory hygiene; not
    /// required for correctness since `is_locked` already treats them as
    /// unlocked.
    pub fn sweep(&mut self) {
        if let Some(timeout) = self.lock_timeout {
            self.locked.retain(|_, acquired_at| acquired_at.elapsed() < timeout);
        }
    }
}

/// A pending correction or divergence flag the pipeline-health tracker
/// monitors for staleness (spec.md §5 "clearStalePipelineOperations").
#[derive(Debug, Clone)]
pub struct PipelineOperation {
    pub name: String,
    pub started_at: Instant,
}

#[derive(Debug, Default)]
pub struct PipelineHealth {
    operations: Vec<PipelineOperation>,
    pipeline_timeout: Option<Duration>,
}

impl PipelineHealth {
    pub fn new(pipeline_timeout: Duration) -> Self {
        Self {
            operations: Vec::new(),
            pipeline_timeout: Some(pipeline_timeout),
        }
    }

    pub fn start(&mut self, name: impl Into<String>) {
        self.operations.push(PipelineOperation {
            name: name.into(),
            started_at: Instant::now(),
        });
    }

    pub fn complete(&mut self, name: &str) {
        self.operations.retain(|op| op.name != name);
    }

    /// Clear operations blocked longer than `PIPELINE_TIMEOUT_MS`,
    /// returning their names so the caller can warn the operator and drop
    /// corrections/divergence flags for them (spec.md §7 `PipelineTimeout`).
    pub fn clear_stale(&mut self) -> Vec<String> {
        let Some(timeout) = self.pipeline_timeout else {
            return Vec::new();
        };
        let (stale, fresh): (Vec<_>, Vec<_>) = self
            .operations
            .drain(..)
            .partition(|op| op.started_at.elapsed() > timeout);
        self.operations = fresh;
        stale.into_iter().map(|op| op.name).collect()
    }
}

/// Lifecycle flags gating what the Orchestrator will do this cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct LifecycleFlags {
    pub is_bootstrapping: bool,
    pub is_broadcasting: bool,
}

/// Orchestrator (spec.md §4.5, component E): owns the lock registry,
/// shadow-lock map, pipeline-health tracker, and lifecycle flags, and is
/// the only component permitted to gate persistence. Grounded on the
/// teacher's `Engine<S, E>` (`bog-core::engine::generic`), which likewise
/// holds every piece of run-loop state behind one struct rather than
/// scattering locks/flags across free functions; this engine's run loop
/// is async and cooperatively single-threaded rather than a const-generic
/// hot path, so `Manager` holds `tokio` primitives instead of `Engine`'s
/// cache-aligned atomics.
pub struct Manager {
    pub locks: LockRegistry,
    pub shadow_locks: ShadowLockMap,
    pub health: PipelineHealth,
    pub flags: LifecycleFlags,
}

impl Manager {
    pub fn new(shadow_lock_timeout: Duration, pipeline_timeout: Duration) -> Self {
        Self {
            locks: LockRegistry::new(),
            shadow_locks: ShadowLockMap::new(shadow_lock_timeout),
            health: PipelineHealth::new(pipeline_timeout),
            flags: LifecycleFlags::default(),
        }
    }

    /// Run `persist` only if `validate_grid_state_for_persistence` passes;
    /// otherwise logs and skips it as a no-op (spec.md §8 property 9).
    /// A failed gate is never propagated as a cycle error — persistence is
    /// simply deferred to the next cycle, once the state is sound again.
    pub async fn persist_if_sound<F, Fut>(
        &self,
        has_phantom_orders: bool,
        account_totals_initialized: bool,
        invariant_violation: Option<ErrorKind>,
        persist: F,
    ) -> Result<(), ErrorKind>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), ErrorKind>>,
    {
        match validate_grid_state_for_persistence(
            has_phantom_orders,
            account_totals_initialized,
            invariant_violation,
            self.flags.is_bootstrapping,
        ) {
            Ok(()) => persist().await,
            Err(e) => {
                tracing::warn!(error = %e, "skipping persistence: grid state failed the gate");
                Ok(())
            }
        }
    }
}

/// Gate for `persistGrid()` (spec.md §7, §8 property 9): a no-op with a
/// validation error when phantom orders exist, account totals are
/// uninitialized, or fund drift exceeds tolerance outside bootstrap.
pub fn validate_grid_state_for_persistence(
    has_phantom_orders: bool,
    account_totals_initialized: bool,
    invariant_violation: Option<ErrorKind>,
    is_bootstrapping: bool,
) -> Result<(), ErrorKind> {
    if has_phantom_orders {
        return Err(ErrorKind::IllegalTransition {
            reason: "refusing to persist: phantom orders present".to_string(),
        });
    }
    if !account_totals_initialized {
        return Err(ErrorKind::IllegalTransition {
            reason: "refusing to persist: account totals uninitialized".to_string(),
        });
    }
    if !is_bootstrapping {
        if let Some(violation) = invariant_violation {
            return Err(violation);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grid_lock_excludes_concurrent_holders() {
        let registry = LockRegistry::new();
        let _guard = registry.acquire_grid_lock().await;
        assert_eq!(registry.acquisitions(), 1);
    }

    #[test]
    fn sync_source_routing_is_pinned() {
        assert!(SyncSource::CreateOrder.acquires_grid_lock());
        assert!(SyncSource::CancelOrder.acquires_grid_lock());
        assert!(SyncSource::Custom.acquires_grid_lock());
        assert!(!SyncSource::ReadOpenOrders.acquires_grid_lock());
        assert!(!SyncSource::PeriodicBlockchainFetch.acquires_grid_lock());
    }

    #[test]
    fn shadow_lock_self_heals_after_timeout() {
        let mut locks = ShadowLockMap::new(Duration::from_millis(10));
        locks.lock(OrderId(1));
        assert!(locks.is_locked(OrderId(1)));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!locks.is_locked(OrderId(1)));
    }

    #[test]
    fn shadow_lock_unlock_is_immediate() {
        let mut locks = ShadowLockMap::new(Duration::from_secs(30));
        locks.lock(OrderId(1));
        locks.unlock(OrderId(1));
        assert!(!locks.is_locked(OrderId(1)));
    }

    #[test]
    fn pipeline_health_clears_stale_operations() {
        let mut health = PipelineHealth::new(Duration::from_millis(5));
        health.start("divergence-correction");
        std::thread::sleep(Duration::from_millis(10));
        let stale = health.clear_stale();
        assert_eq!(stale, vec!["divergence-correction".to_string()]);
    }

    #[test]
    fn pipeline_health_does_not_clear_fresh_operations() {
        let mut health = PipelineHealth::new(Duration::from_secs(30));
        health.start("correction");
        assert!(health.clear_stale().is_empty());
    }

    #[test]
    fn persistence_gate_rejects_phantom_orders() {
        let result = validate_grid_state_for_persistence(true, true, None, false);
        assert!(result.is_err());
    }

    #[test]
    fn persistence_gate_rejects_uninitialized_totals() {
        let result = validate_grid_state_for_persistence(false, false, None, false);
        assert!(result.is_err());
    }

    #[test]
    fn persistence_gate_ignores_drift_during_bootstrap() {
        let violation = ErrorKind::InvariantViolation {
            side: crate::core::types::Side::Buy,
            drift: rust_decimal::Decimal::ONE,
            allowed: rust_decimal::Decimal::ZERO,
        };
        let result = validate_grid_state_for_persistence(false, true, Some(violation), true);
        assert!(result.is_ok());
    }

    #[test]
    fn persistence_gate_rejects_drift_outside_bootstrap() {
        let violation = ErrorKind::InvariantViolation {
            side: crate::core::types::Side::Buy,
            drift: rust_decimal::Decimal::ONE,
            allowed: rust_decimal::Decimal::ZERO,
        };
        let result = validate_grid_state_for_persistence(false, true, Some(violation), false);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn manager_skips_persist_when_phantoms_present() {
        let manager = Manager::new(Duration::from_secs(30), Duration::from_secs(60));
        let mut called = false;
        manager
            .persist_if_sound(true, true, None, || async {
                called = true;
                Ok(())
            })
            .await
            .unwrap();
        assert!(!called);
    }

    #[tokio::test]
    async fn manager_persists_when_state_is_sound() {
        let manager = Manager::new(Duration::from_secs(30), Duration::from_secs(60));
        let mut called = false;
        manager
            .persist_if_sound(false, true, None, || async {
                called = true;
                Ok(())
            })
            .await
            .unwrap();
        assert!(called);
    }
}
