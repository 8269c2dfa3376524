//! Admission control for concurrent batch dispatches

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds how many dispatches run at the same time
///
/// Slots are requested per batch and held until the batch's whole retry chain
/// has completed. Waiters are served in FIFO order.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// An admitted dispatch. Dropping the slot releases it.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

impl Slot {
    /// Release the slot explicitly
    pub fn release(self) {}
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait until a slot is free and take it
    pub async fn acquire(&self) -> Slot {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            // `permits` is private to the limiter and never closed
            Err(_) => unreachable!("limiter semaphore closed"),
        };

        Slot { _permit: permit }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_slots_are_released_on_drop() {
        let limiter = ConcurrencyLimiter::new(2);

        let a = limiter.acquire().await;
        let b = limiter.acquire().await;
        assert_eq!(limiter.available(), 0);

        drop(a);
        assert_eq!(limiter.available(), 1);

        b.release();
        assert_eq!(limiter.available(), 2);
        assert_eq!(limiter.capacity(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_a_free_slot() {
        let limiter = ConcurrencyLimiter::new(1);
        let held = limiter.acquire().await;

        let waiter = tokio::spawn({
            let limiter = limiter.clone();
            async move { limiter.acquire().await.release() }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap();
        assert_eq!(limiter.available(), 1);
    }
}
