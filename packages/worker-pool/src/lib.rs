//! A bounded pool of execution slots.
//!
//! Both the tracker and the peer own one [`WorkerPool`] per process and draw
//! every inbound connection and every in-flight piece transfer from it, which
//! bounds the number of concurrent tasks without a per-call-site limit.
//!
//! A slot is a semaphore permit: [`WorkerPool::acquire`] waits until one is
//! free and never fails, and dropping the returned [`Slot`] releases it and
//! wakes one waiter. [`WorkerPool::spawn`] runs a future inside its own task
//! while holding a slot; a panic inside the future is caught at the slot
//! boundary, logged, and the slot is released on every exit path, so a
//! faulty unit of work can never leak capacity. [`WorkerPool::drain`] parks
//! the caller until every currently-occupied slot has completed, which is
//! how a download waits for all of its piece writes before checking the
//! whole-file hash.
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

/// Lower bound for the hardware-derived capacity.
pub const MIN_WORKERS: usize = 2;

/// Upper bound for the hardware-derived capacity.
pub const MAX_WORKERS: usize = 10;

/// One occupied unit of pool capacity. Dropping it releases the slot and
/// wakes exactly one waiter, if any.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

/// A fixed-capacity pool of execution slots with blocking acquire/release.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    /// Creates a pool with a fixed number of slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "worker pool capacity must be at least one slot");
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Creates a pool whose capacity is derived from the available hardware
    /// parallelism, clamped to `[MIN_WORKERS, MAX_WORKERS]`.
    #[must_use]
    pub fn with_hardware_capacity() -> Self {
        let parallelism = std::thread::available_parallelism().map_or(MIN_WORKERS, std::num::NonZeroUsize::get);

        Self::new(parallelism.clamp(MIN_WORKERS, MAX_WORKERS))
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of currently free slots.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits until a slot is free and occupies it. Never fails.
    ///
    /// # Panics
    ///
    /// Panics if the internal semaphore has been closed, which this type
    /// never does.
    pub async fn acquire(&self) -> Slot {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("the pool semaphore is never closed");

        Slot { _permit: permit }
    }

    /// Acquires a slot, then runs `fut` in its own task while holding it.
    ///
    /// The slot is released on every exit path of `fut`, including a panic:
    /// the panic is caught at the slot boundary and logged, never
    /// propagated.
    pub async fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let slot = self.acquire().await;

        tokio::spawn(async move {
            if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                tracing::error!(tag = "ERROR", "worker task panicked; slot released");
            }
            drop(slot);
        })
    }

    /// Waits until every currently-occupied slot has completed.
    ///
    /// Implemented by acquiring the pool's full capacity and releasing it
    /// again, so the caller resumes only after all outstanding units of work
    /// have returned their slots.
    ///
    /// # Panics
    ///
    /// Panics if the internal semaphore has been closed, which this type
    /// never does.
    pub async fn drain(&self) {
        let all = self
            .semaphore
            .acquire_many(u32::try_from(self.capacity).expect("pool capacity fits in u32"))
            .await
            .expect("the pool semaphore is never closed");

        drop(all);
    }
}

#[cfg(test)]
mod tests {

    mod the_worker_pool {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use std::time::Duration;

        use crate::{WorkerPool, MAX_WORKERS, MIN_WORKERS};

        #[test]
        fn it_should_clamp_the_hardware_derived_capacity() {
            let pool = WorkerPool::with_hardware_capacity();

            assert!(pool.capacity() >= MIN_WORKERS);
            assert!(pool.capacity() <= MAX_WORKERS);
        }

        #[tokio::test]
        async fn it_should_never_grant_more_slots_than_its_capacity() {
            let pool = WorkerPool::new(2);

            let running = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            for _ in 0..8 {
                let running = running.clone();
                let peak = peak.clone();
                pool.spawn(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }

            pool.drain().await;

            assert!(peak.load(Ordering::SeqCst) <= 2, "peak concurrency exceeded the pool capacity");
        }

        #[tokio::test]
        async fn it_should_block_acquire_until_a_slot_is_released() {
            let pool = WorkerPool::new(1);

            let slot = pool.acquire().await;

            let contender = {
                let pool = pool.clone();
                tokio::spawn(async move {
                    let _slot = pool.acquire().await;
                })
            };

            // The contender cannot finish while the only slot is held.
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(!contender.is_finished());

            drop(slot);

            tokio::time::timeout(Duration::from_secs(1), contender)
                .await
                .expect("contender should acquire the released slot")
                .unwrap();
        }

        #[tokio::test]
        async fn clones_should_draw_from_the_same_slots() {
            let pool = WorkerPool::new(2);
            let clone = pool.clone();

            let _first = pool.acquire().await;
            let _second = clone.acquire().await;

            assert_eq!(pool.available(), 0);
            assert_eq!(clone.available(), 0);
        }

        #[tokio::test]
        async fn a_task_that_panics_should_still_return_its_slot() {
            let pool = WorkerPool::new(2);

            let handle = pool
                .spawn(async {
                    panic!("boom");
                })
                .await;

            let _result = handle.await;
            pool.drain().await;

            assert_eq!(pool.available(), 2);
        }

        #[tokio::test]
        async fn drain_should_wait_for_every_occupied_slot() {
            let pool = WorkerPool::new(3);

            let completed = Arc::new(AtomicUsize::new(0));

            for _ in 0..6 {
                let completed = completed.clone();
                pool.spawn(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                })
                .await;
            }

            pool.drain().await;

            assert_eq!(completed.load(Ordering::SeqCst), 6);
            assert_eq!(pool.available(), 3);
        }
    }
}
