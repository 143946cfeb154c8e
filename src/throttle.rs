//! Provides the outbound rate limiter shared by every probe task of a run.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Burst headroom granted on top of the steady packet rate.
const BURST_CAPACITY: f64 = 10.0;

/// Token bucket metering outbound connection attempts across a whole run.
///
/// Built once per run and handed to the probing engine behind an `Arc`, so
/// every worker of every concurrently scanned host draws from the same
/// budget. A rate of zero disables limiting and [`Throttle::take`]
/// degenerates to a no-op.
#[derive(Debug)]
pub struct Throttle {
    state: Option<Mutex<Bucket>>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    rate: f64,
    last_refill: Instant,
}

impl Bucket {
    /// Refills from elapsed time, then either spends one token or reports
    /// how long the caller must sleep for one to accrue.
    fn poll(&mut self) -> Option<Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = BURST_CAPACITY.min(self.tokens + elapsed * self.rate);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64((1.0 - self.tokens) / self.rate))
        }
    }
}

impl Throttle {
    /// Creates a limiter admitting `pps` sends per second after an initial
    /// burst. Zero disables limiting.
    #[must_use]
    pub fn new(pps: u32) -> Self {
        let state = (pps > 0).then(|| {
            Mutex::new(Bucket {
                tokens: BURST_CAPACITY,
                rate: f64::from(pps),
                last_refill: Instant::now(),
            })
        });
        Self { state }
    }

    /// Waits until one send token is available and spends it.
    ///
    /// Returns `false` when the run is cancelled before a token accrues; the
    /// caller must not send in that case. The bucket is locked only to
    /// account, never across the sleep, so waiting tasks do not serialize
    /// behind each other.
    pub async fn take(&self, cancel: &CancellationToken) -> bool {
        let Some(bucket) = &self.state else {
            return true;
        };

        loop {
            if cancel.is_cancelled() {
                return false;
            }

            let wait = {
                let mut bucket = bucket.lock().await;
                bucket.poll()
            };
            let Some(wait) = wait else {
                return true;
            };

            tokio::select! {
                () = cancel.cancelled() => return false,
                () = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use super::Throttle;

    #[tokio::test(start_paused = true)]
    async fn burst_is_served_without_waiting() {
        let throttle = Throttle::new(5);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..10 {
            assert!(throttle.take(&cancel).await);
        }
        assert_eq!(Instant::now(), start);

        assert!(throttle.take(&cancel).await);
        assert!(Instant::now() - start >= Duration::from_millis(195));
    }

    #[tokio::test(start_paused = true)]
    async fn steady_rate_is_honored_after_the_burst() {
        let throttle = Throttle::new(5);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..20 {
            assert!(throttle.take(&cancel).await);
        }
        let elapsed = Instant::now() - start;

        // 10 burst tokens are free, the remaining 10 accrue at 5/s.
        assert!(elapsed >= Duration::from_millis(1_950), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(2_500), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_never_overfills_the_bucket() {
        let throttle = Throttle::new(5);
        let cancel = CancellationToken::new();

        tokio::time::sleep(Duration::from_secs(60)).await;

        let start = Instant::now();
        for _ in 0..10 {
            assert!(throttle.take(&cancel).await);
        }
        assert_eq!(Instant::now(), start);

        assert!(throttle.take(&cancel).await);
        assert!(Instant::now() > start);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_rate_never_waits() {
        let throttle = Throttle::new(0);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..10_000 {
            assert!(throttle.take(&cancel).await);
        }
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_unblocks_a_waiting_task() {
        let throttle = Arc::new(Throttle::new(1));
        let cancel = CancellationToken::new();

        // Drain the burst so the next take has to wait a full second.
        for _ in 0..10 {
            assert!(throttle.take(&cancel).await);
        }

        let waiter = {
            let throttle = Arc::clone(&throttle);
            let cancel = cancel.clone();
            tokio::spawn(async move { throttle.take(&cancel).await })
        };

        let start = Instant::now();
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        assert!(!waiter.await.unwrap());
        assert!(Instant::now() - start < Duration::from_millis(500));

        // Once cancelled, takes fail fast even if tokens have accrued.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!throttle.take(&cancel).await);
    }
}
