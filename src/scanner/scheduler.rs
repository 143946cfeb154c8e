//! Bounded admission of per-host scan tasks.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Keeps one host's scan slot occupied while held.
///
/// Dropping the guard, normally when the spawned host task finishes, frees
/// the slot for the next host.
#[derive(Debug)]
pub struct SlotGuard {
    _permit: OwnedSemaphorePermit,
}

/// Admits at most a fixed number of concurrent host scans.
#[derive(Debug)]
pub struct Scheduler {
    slots: Arc<Semaphore>,
    capacity: usize,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Creates a scheduler with `capacity` slots, clamped to a workable
    /// window so a zero from configuration still makes progress.
    #[must_use]
    pub fn new(capacity: usize, cancel: CancellationToken) -> Self {
        let capacity = capacity.clamp(1, 5_000);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            cancel,
        }
    }

    /// Slots this scheduler will hand out at once.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Waits for a free slot.
    ///
    /// Returns `None` once the run is cancelled. Cancellation is checked
    /// ahead of slot availability, so a cancel racing a released slot never
    /// admits another host.
    pub async fn acquire(&self) -> Option<SlotGuard> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            permit = Arc::clone(&self.slots).acquire_owned() => {
                permit.ok().map(|permit| SlotGuard { _permit: permit })
            }
        }
    }

    /// Waits until every admitted host scan has released its slot.
    pub async fn drain(&self) {
        let capacity = u32::try_from(self.capacity).unwrap_or(u32::MAX);
        // The semaphore is never closed, so this only resolves once all
        // guards are back.
        if let Ok(all) = self.slots.acquire_many(capacity).await {
            drop(all);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    use super::Scheduler;

    #[tokio::test]
    async fn capacity_bounds_outstanding_slots() {
        let scheduler = Scheduler::new(2, CancellationToken::new());

        let first = scheduler.acquire().await.unwrap();
        let _second = scheduler.acquire().await.unwrap();

        let blocked = timeout(Duration::from_millis(50), scheduler.acquire()).await;
        assert!(blocked.is_err());

        drop(first);
        let third = timeout(Duration::from_millis(200), scheduler.acquire()).await;
        assert!(third.unwrap().is_some());
    }

    #[tokio::test]
    async fn cancelled_scheduler_stops_admitting() {
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(4, cancel.clone());

        cancel.cancel();

        // Slots are free, yet nothing is admitted once cancelled.
        assert!(scheduler.acquire().await.is_none());
    }

    #[tokio::test]
    async fn drain_waits_for_every_guard() {
        let scheduler = Arc::new(Scheduler::new(3, CancellationToken::new()));
        let guard = scheduler.acquire().await.unwrap();

        let drainer = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.drain().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!drainer.is_finished());

        drop(guard);
        timeout(Duration::from_millis(200), drainer)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn zero_capacity_is_promoted_to_one() {
        let scheduler = Scheduler::new(0, CancellationToken::new());
        assert_eq!(scheduler.capacity(), 1);
        assert!(scheduler.acquire().await.is_some());
    }
}
