use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Continuous-refill token bucket gating outbound requests per minute.
///
/// `acquire` must never hold `state` across the sleep that waits for a
/// token to become available: an async `Mutex` held across an `.await` that
/// can take tens of seconds would serialize every other task waiting on the
/// same bucket behind it, defeating the whole point of a shared rate
/// limiter. Instead the wait time is computed and the lock released before
/// sleeping, then briefly re-acquired to debit the token that was waited for.
pub struct TokenBucket {
    state: Mutex<BucketState>,
}

struct BucketState {
    capacity: f64,
    tokens: f64,
    fill_rate_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// `requests_per_minute` is both the bucket's capacity and the basis for
    /// its refill rate (capacity/60 tokens per second), per the rate-limit
    /// contract: a burst up to `rpm_limit` requests may fire immediately,
    /// then the bucket throttles to the steady-state rate.
    pub fn new(requests_per_minute: f64) -> Self {
        Self {
            state: Mutex::new(BucketState {
                capacity: requests_per_minute,
                tokens: requests_per_minute,
                fill_rate_per_sec: requests_per_minute / 60.0,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Block until at least one token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                state.refill();
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / state.fill_rate_per_sec))
                }
            };
            match wait {
                None => return,
                Some(duration) => sleep(duration).await,
            }
        }
    }
}

impl BucketState {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.fill_rate_per_sec).min(self.capacity);
        self.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn drains_then_refills() {
        let bucket = Arc::new(TokenBucket::new(6000.0)); // 100 tokens/sec, capacity 6000
        bucket.acquire().await;
        bucket.acquire().await;
        let start = Instant::now();
        bucket.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn concurrent_waiters_do_not_deadlock() {
        let bucket = Arc::new(TokenBucket::new(480.0)); // capacity 8, 8 tokens/sec
        let mut handles = Vec::new();
        for _ in 0..8 {
            let b = bucket.clone();
            handles.push(tokio::spawn(async move {
                b.acquire().await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }
}
