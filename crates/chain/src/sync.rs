//! Election of the single foreground synchronizer.
//!
//! One process-wide slot identifies the active sync. Whoever holds the
//! lease runs at full speed; everyone else is throttled. Releasing the
//! lease publishes the state change and kicks off garbage collection of
//! sync bookkeeping below the peak.

use crate::{ChainCells, ChainEvent, EventBus, SyncGc};
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::runtime::Handle;

/// Proof of holding the active-sync slot.
///
/// Obtained from [`SyncCoordinator::acquire`]; hand it back through
/// [`SyncCoordinator::finish`] when the sync run completes.
#[derive(Debug)]
pub struct SyncLease {
    id: u64,
}

/// The process-wide active-sync slot.
#[derive(Debug)]
pub struct SyncCoordinator {
    slot: Mutex<Option<u64>>,
    next_id: AtomicU64,
    events: EventBus,
    cells: Arc<ChainCells>,
    gc: Arc<dyn SyncGc>,
    throttle: Duration,
}

impl SyncCoordinator {
    /// Creates a coordinator with an empty slot.
    pub fn new(
        events: EventBus,
        cells: Arc<ChainCells>,
        gc: Arc<dyn SyncGc>,
        throttle: Duration,
    ) -> Self {
        Self { slot: Mutex::new(None), next_id: AtomicU64::new(1), events, cells, gc, throttle }
    }

    /// Claims the slot if it is empty.
    ///
    /// On success publishes `Syncing(true)` and returns the lease. Returns
    /// `None` while another synchronizer is active.
    pub fn acquire(&self) -> Option<SyncLease> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        *slot = Some(id);
        drop(slot);

        info!(target: "sync", id, "Claimed the active-sync slot");
        self.events.publish(ChainEvent::Syncing(true));
        Some(SyncLease { id })
    }

    /// Whether the given lease still holds the slot.
    pub fn holds(&self, lease: &SyncLease) -> bool {
        *self.slot.lock() == Some(lease.id)
    }

    /// Whether any synchronizer is active.
    pub fn is_active(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Gate for sync work.
    ///
    /// The active synchronizer proceeds immediately; background callers are
    /// logged and slept for the configured throttle before returning.
    pub async fn throttle(&self, lease: Option<&SyncLease>, context: &'static str) {
        if lease.is_some_and(|lease| self.holds(lease)) {
            debug!(target: "sync", context, "Active sync proceeding");
            return;
        }
        info!(
            target: "sync",
            context,
            delay_secs = self.throttle.as_secs(),
            "Background sync throttled"
        );
        tokio::time::sleep(self.throttle).await;
    }

    /// Releases the slot.
    ///
    /// Publishes `Syncing(false)` and garbage-collects sync metadata below
    /// the current peak on a background task.
    pub fn finish(&self, lease: SyncLease) {
        {
            let mut slot = self.slot.lock();
            if *slot == Some(lease.id) {
                *slot = None;
            }
        }
        info!(target: "sync", id = lease.id, "Released the active-sync slot");
        self.events.publish(ChainEvent::Syncing(false));

        let below = self.cells.peak_number();
        let gc = Arc::clone(&self.gc);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { gc.collect_below(below) });
            }
            Err(_) => gc.collect_below(below),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoopOutbound;

    fn coordinator() -> SyncCoordinator {
        SyncCoordinator::new(
            EventBus::new(),
            Arc::new(ChainCells::new()),
            Arc::new(NoopOutbound),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn only_one_lease_at_a_time() {
        let sync = coordinator();

        let lease = sync.acquire().expect("slot empty");
        assert!(sync.is_active());
        assert!(sync.holds(&lease));
        assert!(sync.acquire().is_none());

        sync.finish(lease);
        assert!(!sync.is_active());
        assert!(sync.acquire().is_some());
    }

    #[tokio::test]
    async fn claim_and_release_publish_sync_events() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let sync = SyncCoordinator::new(
            events,
            Arc::new(ChainCells::new()),
            Arc::new(NoopOutbound),
            Duration::from_millis(10),
        );

        let lease = sync.acquire().unwrap();
        sync.finish(lease);

        assert!(matches!(rx.recv().await.unwrap(), ChainEvent::Syncing(true)));
        assert!(matches!(rx.recv().await.unwrap(), ChainEvent::Syncing(false)));
    }

    #[tokio::test(start_paused = true)]
    async fn background_callers_are_throttled() {
        let sync = coordinator();
        let lease = sync.acquire().unwrap();

        let started = tokio::time::Instant::now();
        // The holder passes straight through.
        sync.throttle(Some(&lease), "import").await;
        assert_eq!(started.elapsed(), Duration::ZERO);

        // A non-holder sleeps for the full throttle.
        sync.throttle(None, "import").await;
        assert!(started.elapsed() >= Duration::from_millis(10));
    }
}
