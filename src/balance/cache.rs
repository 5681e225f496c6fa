//! Per-player balance view: optimistic local mutation with debounced
//! authoritative reconciliation.
//!
//! `get` and `apply` never block on network or timers; at most they perform
//! an in-memory operation and arm an asynchronous trigger. The effective
//! balance shown to a player is always `confirmed + pending`; `pending` is
//! cleared only when a fresh confirmed value that already reflects it is
//! fetched.

use crate::balance::store::BalanceStore;
use crate::errors::{PlaceError, StoreError};
use crate::games::types::Amount;
use crate::metrics::EngineMetrics;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_FRESHNESS: Duration = Duration::from_secs(30);
const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(3);

struct BalanceEntry {
    /// Last value confirmed by the authoritative store, minor units.
    confirmed: AtomicI64,
    /// Signed optimistic delta applied since the last confirmation.
    pending: AtomicI64,
    /// Unix millis of the last successful reconciliation; 0 = never.
    last_synced_ms: AtomicI64,
    /// Debounce guard: true while a reconciliation is armed.
    reconcile_armed: AtomicBool,
}

impl BalanceEntry {
    fn new() -> Self {
        Self {
            confirmed: AtomicI64::new(0),
            pending: AtomicI64::new(0),
            last_synced_ms: AtomicI64::new(0),
            reconcile_armed: AtomicBool::new(false),
        }
    }

    fn effective(&self) -> Amount {
        let value = self.confirmed.load(Ordering::SeqCst) + self.pending.load(Ordering::SeqCst);
        value.max(0) as Amount
    }
}

/// Cached balance views for all players, backed by the authoritative store.
pub struct BalanceCache {
    store: Arc<dyn BalanceStore>,
    entries: DashMap<String, Arc<BalanceEntry>>,
    metrics: Arc<EngineMetrics>,
    freshness: Duration,
    debounce: Duration,
    fetch_timeout: Duration,
}

impl BalanceCache {
    pub fn new(store: Arc<dyn BalanceStore>, metrics: Arc<EngineMetrics>) -> Self {
        Self::with_timing(
            store,
            metrics,
            DEFAULT_FRESHNESS,
            DEFAULT_DEBOUNCE,
            DEFAULT_FETCH_TIMEOUT,
        )
    }

    pub fn with_timing(
        store: Arc<dyn BalanceStore>,
        metrics: Arc<EngineMetrics>,
        freshness: Duration,
        debounce: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            entries: DashMap::new(),
            metrics,
            freshness,
            debounce,
            fetch_timeout,
        }
    }

    fn entry(&self, player_id: &str) -> Arc<BalanceEntry> {
        self.entries
            .entry(player_id.to_string())
            .or_insert_with(|| Arc::new(BalanceEntry::new()))
            .clone()
    }

    /// Effective balance for a player. Never blocks: a stale entry returns
    /// its last known value immediately and triggers a background refresh.
    ///
    /// A nonzero pending delta is always considered authoritative for
    /// responsiveness, so freshness only matters for settled entries.
    pub fn get(&self, player_id: &str) -> Amount {
        let entry = self.entry(player_id);
        let pending = entry.pending.load(Ordering::SeqCst);
        let age_ms = Utc::now().timestamp_millis() - entry.last_synced_ms.load(Ordering::SeqCst);

        if pending == 0 && age_ms as u128 > self.freshness.as_millis() {
            self.schedule_reconcile(player_id, &entry);
        }
        entry.effective()
    }

    /// Apply a signed delta to a player's pending balance and arm a
    /// debounced reconciliation. Atomic add; safe under concurrent
    /// placement and settlement for the same player.
    pub fn apply(&self, player_id: &str, delta: i64) {
        let entry = self.entry(player_id);
        entry.pending.fetch_add(delta, Ordering::SeqCst);
        self.schedule_reconcile(player_id, &entry);
    }

    /// Atomically debit `cost` if the effective balance covers it.
    ///
    /// Uses a compare-exchange loop on the pending delta so two concurrent
    /// debits racing for the same funds can never both succeed.
    pub fn try_debit(&self, player_id: &str, cost: Amount) -> Result<(), PlaceError> {
        let entry = self.entry(player_id);
        loop {
            let pending = entry.pending.load(Ordering::SeqCst);
            let confirmed = entry.confirmed.load(Ordering::SeqCst);
            if confirmed + pending < cost as i64 {
                return Err(PlaceError::InsufficientBalance);
            }
            match entry.pending.compare_exchange(
                pending,
                pending - cost as i64,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    self.schedule_reconcile(player_id, &entry);
                    return Ok(());
                }
                Err(_) => continue,
            }
        }
    }

    /// Synchronously-awaited reconciliation for one player. Used where the
    /// caller wants a warm entry (API balance reads, tests); the engine's
    /// hot paths only ever use the debounced trigger.
    pub async fn reconcile_now(&self, player_id: &str) -> Result<(), StoreError> {
        let entry = self.entry(player_id);
        Self::reconcile(
            &self.store,
            &self.metrics,
            player_id,
            &entry,
            self.fetch_timeout,
        )
        .await
    }

    /// Arm a debounced reconciliation for this entry. Bursts of applies
    /// within the debounce window coalesce into a single fetch issued after
    /// the window closes.
    fn schedule_reconcile(&self, player_id: &str, entry: &Arc<BalanceEntry>) {
        if entry.reconcile_armed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Outside a runtime (sync callers in tests) there is nothing to arm.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            entry.reconcile_armed.store(false, Ordering::Release);
            return;
        };

        let store = Arc::clone(&self.store);
        let metrics = Arc::clone(&self.metrics);
        let entry = Arc::clone(entry);
        let player_id = player_id.to_string();
        let debounce = self.debounce;
        let fetch_timeout = self.fetch_timeout;

        handle.spawn(async move {
            tokio::time::sleep(debounce).await;
            // Disarm before the fetch: deltas applied while the fetch is in
            // flight must be able to arm the next reconciliation.
            entry.reconcile_armed.store(false, Ordering::Release);
            if let Err(err) =
                Self::reconcile(&store, &metrics, &player_id, &entry, fetch_timeout).await
            {
                tracing::warn!(player = %player_id, "balance reconciliation failed: {}", err);
            }
        });
    }

    async fn reconcile(
        store: &Arc<dyn BalanceStore>,
        metrics: &Arc<EngineMetrics>,
        player_id: &str,
        entry: &Arc<BalanceEntry>,
        fetch_timeout: Duration,
    ) -> Result<(), StoreError> {
        // Snapshot the pending delta at issue time: the store is expected to
        // reflect every delta committed before this instant, so exactly this
        // much pending is retired when the fetch lands. Deltas applied while
        // the fetch is in flight stay pending.
        let issued_pending = entry.pending.load(Ordering::SeqCst);
        metrics.reconcile_fetches.inc();

        let fetched = match tokio::time::timeout(fetch_timeout, store.fetch_balance(player_id)).await
        {
            Ok(Ok(balance)) => balance,
            Ok(Err(err)) => {
                metrics.reconcile_failures.inc();
                return Err(err);
            }
            Err(_) => {
                metrics.reconcile_failures.inc();
                return Err(StoreError::Unavailable("fetch timed out".to_string()));
            }
        };

        entry.confirmed.store(fetched as i64, Ordering::SeqCst);
        entry.pending.fetch_sub(issued_pending, Ordering::SeqCst);
        entry
            .last_synced_ms
            .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
        Ok(())
    }
}
