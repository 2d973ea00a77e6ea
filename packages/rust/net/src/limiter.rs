//! Host-scoped token buckets.
//!
//! Each limited host carries two buckets: a daily quota bucket and a burst
//! bucket. A request must take one token from each. Callers block until
//! tokens are available or their deadline passes.

use std::time::{Duration, Instant};

use dartsearch_shared::{DartSearchError, Result};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Seconds in a day, for the quota bucket refill rate.
const DAY_SECS: f64 = 86_400.0;

/// One token bucket: `{capacity, tokens, last_refill, refill_rate}`.
#[derive(Debug)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Time until one token is available, or zero if one is available now.
    fn wait_for_one(&self) -> Duration {
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_per_sec)
        }
    }
}

/// Token buckets guarding one upstream host.
#[derive(Debug)]
pub struct HostLimiter {
    state: Mutex<HostBuckets>,
}

#[derive(Debug)]
struct HostBuckets {
    daily: Bucket,
    burst: Bucket,
    throttled: u64,
}

impl HostLimiter {
    /// `daily` requests per day plus `burst` requests per second.
    pub fn new(daily: u32, burst: u32) -> Self {
        Self {
            state: Mutex::new(HostBuckets {
                daily: Bucket::new(daily as f64, daily as f64 / DAY_SECS),
                burst: Bucket::new(burst as f64, burst as f64),
                throttled: 0,
            }),
        }
    }

    /// Take one token from both buckets, waiting up to `deadline`.
    ///
    /// Returns `RateLimited` when the deadline passes first and `Cancelled`
    /// when the run's token fires.
    pub async fn acquire(&self, deadline: Instant, cancel: &CancellationToken) -> Result<()> {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.daily.refill(now);
                state.burst.refill(now);

                let wait = state.daily.wait_for_one().max(state.burst.wait_for_one());
                if wait.is_zero() {
                    state.daily.tokens -= 1.0;
                    state.burst.tokens -= 1.0;
                    return Ok(());
                }
                state.throttled += 1;
                wait
            };

            let now = Instant::now();
            if now + wait > deadline {
                return Err(DartSearchError::RateLimited(format!(
                    "token not available within deadline (needed {} ms more)",
                    wait.as_millis()
                )));
            }

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return Err(DartSearchError::Cancelled),
            }
        }
    }

    /// How many acquisitions had to wait, for run-completion logging.
    pub async fn throttled_count(&self) -> u64 {
        self.state.lock().await.throttled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_limits_concurrent_callers() {
        // 3 burst tokens per second: of 6 concurrent acquires with a short
        // deadline, exactly 3 complete before refill.
        let limiter = std::sync::Arc::new(HostLimiter::new(1000, 3));
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let deadline = Instant::now() + Duration::from_millis(50);
                limiter.acquire(deadline, &cancel).await.is_ok()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 3);
    }

    #[tokio::test]
    async fn tokens_replenish_over_time() {
        let limiter = HostLimiter::new(1000, 2);
        let cancel = CancellationToken::new();

        for _ in 0..2 {
            limiter
                .acquire(Instant::now() + Duration::from_millis(10), &cancel)
                .await
                .unwrap();
        }

        // Bucket drained; waiting past the refill point succeeds.
        let deadline = Instant::now() + Duration::from_millis(800);
        limiter.acquire(deadline, &cancel).await.unwrap();
    }

    #[tokio::test]
    async fn deadline_exceeded_is_rate_limited() {
        let limiter = HostLimiter::new(1000, 1);
        let cancel = CancellationToken::new();
        limiter
            .acquire(Instant::now() + Duration::from_millis(10), &cancel)
            .await
            .unwrap();

        let err = limiter
            .acquire(Instant::now() + Duration::from_millis(5), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DartSearchError::RateLimited(_)));
    }

    #[tokio::test]
    async fn cancellation_interrupts_waiters() {
        let limiter = HostLimiter::new(1000, 1);
        let cancel = CancellationToken::new();
        limiter
            .acquire(Instant::now() + Duration::from_millis(10), &cancel)
            .await
            .unwrap();

        let waiter_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let limiter = limiter;
            limiter
                .acquire(Instant::now() + Duration::from_secs(5), &waiter_cancel)
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(DartSearchError::Cancelled)));
    }
}
