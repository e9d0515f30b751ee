//! Slot accounting
//!
//! A fair semaphore counts free slots and a free list says which ones. A
//! [`SlotLease`] owns one slot index until it is dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
struct SlotState {
    free: Mutex<Vec<usize>>,
    busy: AtomicUsize,
    peak: AtomicUsize,
}

/// Fixed set of slot indices handed out in FIFO order of requests
#[derive(Debug)]
pub(crate) struct SlotSet {
    capacity: usize,
    semaphore: Arc<Semaphore>,
    state: Arc<SlotState>,
}

impl SlotSet {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            // Reversed so that slot 0 is handed out first
            state: Arc::new(SlotState {
                free: Mutex::new((0..capacity).rev().collect()),
                busy: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Wait for a free slot
    ///
    /// Fails only once the set has been closed.
    pub(crate) async fn acquire(&self) -> Result<SlotLease, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        Ok(self.lease(permit))
    }

    fn lease(&self, permit: OwnedSemaphorePermit) -> SlotLease {
        // The permit guarantees the free list is non-empty
        let index = self
            .state
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();

        let busy = self.state.busy.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak.fetch_max(busy, Ordering::SeqCst);

        SlotLease {
            index,
            state: self.state.clone(),
            _permit: permit,
        }
    }

    /// Refuse all current and future waiters
    pub(crate) fn close(&self) {
        self.semaphore.close();
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn busy(&self) -> usize {
        self.state.busy.load(Ordering::SeqCst)
    }

    pub(crate) fn peak(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }
}

/// Exclusive use of one slot
///
/// The index goes back on the free list before the permit is released, so
/// the next waiter always finds it.
#[derive(Debug)]
pub(crate) struct SlotLease {
    index: usize,
    state: Arc<SlotState>,
    _permit: OwnedSemaphorePermit,
}

impl SlotLease {
    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.state
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.index);
        self.state.busy.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn leases_are_distinct() {
        let slots = SlotSet::new(3);
        let a = slots.acquire().await.unwrap();
        let b = slots.acquire().await.unwrap();
        let c = slots.acquire().await.unwrap();

        let indices: HashSet<_> = [a.index(), b.index(), c.index()].into_iter().collect();
        assert_eq!(indices, HashSet::from([0, 1, 2]));
        assert_eq!(slots.busy(), 3);
    }

    #[tokio::test]
    async fn first_lease_is_slot_zero() {
        let slots = SlotSet::new(2);
        let lease = slots.acquire().await.unwrap();
        assert_eq!(lease.index(), 0);
    }

    #[tokio::test]
    async fn dropped_lease_is_reused() {
        let slots = SlotSet::new(1);
        let first = slots.acquire().await.unwrap();
        let index = first.index();
        drop(first);

        let second = slots.acquire().await.unwrap();
        assert_eq!(second.index(), index);
        assert_eq!(slots.busy(), 1);
        assert_eq!(slots.peak(), 1);
    }

    #[tokio::test]
    async fn waiters_block_until_release() {
        let slots = Arc::new(SlotSet::new(1));
        let held = slots.acquire().await.unwrap();

        let waiter = {
            let slots = slots.clone();
            tokio::spawn(async move { slots.acquire().await.map(|lease| lease.index()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.unwrap().unwrap(), 0);
    }

    #[tokio::test]
    async fn closed_set_refuses_waiters() {
        let slots = SlotSet::new(1);
        let _held = slots.acquire().await.unwrap();
        slots.close();
        assert!(slots.acquire().await.is_err());
    }

    #[tokio::test]
    async fn peak_tracks_high_water_mark() {
        let slots = SlotSet::new(4);
        let a = slots.acquire().await.unwrap();
        let b = slots.acquire().await.unwrap();
        drop(a);
        drop(b);
        let _c = slots.acquire().await.unwrap();

        assert_eq!(slots.capacity(), 4);
        assert_eq!(slots.busy(), 1);
        assert_eq!(slots.peak(), 2);
    }
}
