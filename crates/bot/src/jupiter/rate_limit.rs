//! Process-wide request pacing for the aggregator API

use std::time::Duration;

use refill_types::{RefillError, RefillResult};
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Hands out one request slot per interval, burst of one
///
/// Callers queue on the next free slot and sleep until it arrives.
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn per_second(requests: u32) -> Self {
        Self::new(Duration::from_secs(1) / requests.max(1))
    }

    /// Wait for a slot, giving up when `cancel` fires
    pub async fn acquire(&self, cancel: &CancellationToken) -> RefillResult<()> {
        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            *next_slot = Some(slot + self.interval);
            slot
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(RefillError::RateLimited {
                reason: "cancelled while waiting for a request slot".to_string(),
            }),
            _ = sleep_until(slot) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_one_request_per_interval() {
        let limiter = RateLimiter::per_second(1);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        limiter.acquire(&cancel).await.unwrap();
        assert_eq!(Instant::now() - start, Duration::ZERO);

        limiter.acquire(&cancel).await.unwrap();
        limiter.acquire(&cancel).await.unwrap();
        assert_eq!(Instant::now() - start, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_limiter_does_not_bank_slots() {
        let limiter = RateLimiter::per_second(1);
        let cancel = CancellationToken::new();

        limiter.acquire(&cancel).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;

        let start = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        limiter.acquire(&cancel).await.unwrap();
        assert_eq!(Instant::now() - start, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait() {
        let limiter = Arc::new(RateLimiter::per_second(1));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire(&cancel).await })
        };
        cancel.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(RefillError::RateLimited { .. })));
    }
}
