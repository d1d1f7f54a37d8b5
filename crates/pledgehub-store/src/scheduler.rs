//! Background sync scheduler.
//!
//! Sync requests land in a single pending slot. One worker task drains the
//! slot, snapshots the store at that moment and runs the reconciler on the
//! blocking pool. Requests that arrive while a pass is running coalesce into
//! exactly one follow-up pass over the latest state, so bursts of writes cost
//! at most two passes.

use crate::collections::CollectionStore;
use crate::reconciler::{Reconciler, SyncReport};
use crate::scope::SyncScope;
use parking_lot::Mutex;
use pledgehub_common::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, error, info};

/// Something that can be asked to persist the store.
///
/// The mutation gate only depends on this, so it can be exercised without a
/// filesystem.
pub trait SyncTrigger: Send + Sync {
    /// Request a sync covering `scope`. Must not block.
    fn trigger(&self, scope: SyncScope);

    /// Counters for health reporting, if the trigger keeps any
    fn stats(&self) -> Option<SyncStatsSnapshot> {
        None
    }
}

/// Sync counters
#[derive(Debug, Default)]
struct SyncStats {
    requested: AtomicU64,
    coalesced: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of the sync counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatsSnapshot {
    /// Sync requests received
    pub requested: u64,
    /// Requests folded into an already pending pass
    pub coalesced: u64,
    /// Passes that finished successfully
    pub completed: u64,
    /// Passes that returned an error
    pub failed: u64,
}

type Waiter = oneshot::Sender<std::result::Result<SyncReport, String>>;

#[derive(Default)]
struct Pending {
    scope: Option<SyncScope>,
    waiters: Vec<Waiter>,
}

struct Shared {
    pending: Mutex<Pending>,
    wake: Notify,
    stats: SyncStats,
}

/// Handle to the sync worker
#[derive(Clone)]
pub struct SyncScheduler {
    shared: Arc<Shared>,
}

impl SyncScheduler {
    /// Start the worker task on the current tokio runtime.
    ///
    /// With a non-zero `debounce` the worker waits that long after being
    /// woken before draining the slot, so closely spaced writes share a pass.
    #[must_use]
    pub fn spawn(store: CollectionStore, reconciler: Reconciler, debounce: Duration) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(Pending::default()),
            wake: Notify::new(),
            stats: SyncStats::default(),
        });
        tokio::spawn(sync_loop(
            Arc::clone(&shared),
            store,
            Arc::new(reconciler),
            debounce,
        ));
        Self { shared }
    }

    /// Queue a sync without waiting for it.
    pub fn request(&self, scope: SyncScope) {
        self.enqueue(scope, None);
    }

    /// Queue a full sync and wait for the pass that covers it.
    ///
    /// # Errors
    /// Returns the reconciler's failure, or an internal error if the worker
    /// is gone.
    pub async fn flush(&self) -> Result<SyncReport> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(SyncScope::Full, Some(tx));
        rx.await
            .map_err(|_| Error::internal("sync worker stopped"))?
            .map_err(|e| Error::internal(format!("sync failed: {e}")))
    }

    #[must_use]
    pub fn stats(&self) -> SyncStatsSnapshot {
        let stats = &self.shared.stats;
        SyncStatsSnapshot {
            requested: stats.requested.load(Ordering::Relaxed),
            coalesced: stats.coalesced.load(Ordering::Relaxed),
            completed: stats.completed.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
        }
    }

    fn enqueue(&self, scope: SyncScope, waiter: Option<Waiter>) {
        let stats = &self.shared.stats;
        stats.requested.fetch_add(1, Ordering::Relaxed);
        {
            let mut pending = self.shared.pending.lock();
            pending.scope = Some(match pending.scope.take() {
                Some(existing) => {
                    stats.coalesced.fetch_add(1, Ordering::Relaxed);
                    existing.merge(scope)
                }
                None => scope,
            });
            pending.waiters.extend(waiter);
        }
        self.shared.wake.notify_one();
    }
}

impl SyncTrigger for SyncScheduler {
    fn trigger(&self, scope: SyncScope) {
        self.request(scope);
    }

    fn stats(&self) -> Option<SyncStatsSnapshot> {
        Some(Self::stats(self))
    }
}

async fn sync_loop(
    shared: Arc<Shared>,
    store: CollectionStore,
    reconciler: Arc<Reconciler>,
    debounce: Duration,
) {
    loop {
        shared.wake.notified().await;
        if !debounce.is_zero() {
            tokio::time::sleep(debounce).await;
        }

        let (scope, waiters) = {
            let mut pending = shared.pending.lock();
            (pending.scope.take(), std::mem::take(&mut pending.waiters))
        };
        let Some(scope) = scope else {
            continue;
        };

        // Snapshot now, not at request time, so the pass sees every write
        // applied so far.
        let snapshot = store.snapshot();
        let worker = Arc::clone(&reconciler);
        let outcome = tokio::task::spawn_blocking(move || worker.sync_scoped(&snapshot, &scope))
            .await
            .map_err(|e| format!("sync task panicked: {e}"))
            .and_then(|result| result.map_err(|e| e.to_string()));

        match &outcome {
            Ok(report) => {
                shared.stats.completed.fetch_add(1, Ordering::Relaxed);
                if report.full {
                    info!(
                        "Synced {} projects: {} shards, {} assigned, {} unassigned, {} pruned",
                        report.projects,
                        report.shards_written,
                        report.donations_assigned,
                        report.unassigned,
                        report.pruned.len()
                    );
                } else {
                    debug!("Synced flat collections");
                }
            }
            Err(e) => {
                shared.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!("Disk sync failed: {}", e);
            }
        }

        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}
