use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::Mutex;

/// Per-client-ip token bucket, refilled at `requests_per_minute / 60`
/// tokens/second up to `burst_size`, starting full. Single-process state —
/// a distributed deployment needs a shared backing store, which is an
/// integration concern this core does not address. Not used by `orch-cli`
/// (it has no HTTP surface); provided so a future HTTP front-end can reuse
/// the bucket semantics described in the concurrency model.
pub struct RateLimiter {
    requests_per_minute: f64,
    burst_size: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(requests_per_minute: f64, burst_size: f64) -> Self {
        Self {
            requests_per_minute,
            burst_size,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Attempts to consume one token for `client_ip`. Returns `true` if
    /// allowed.
    pub async fn try_acquire(&self, client_ip: &str) -> bool {
        let refill_rate = self.requests_per_minute / 60.0;
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        let bucket = buckets.entry(client_ip.to_owned()).or_insert_with(|| Bucket {
            tokens: self.burst_size,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * refill_rate).min(self.burst_size);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exhausts_burst_then_refuses() {
        let limiter = RateLimiter::new(60.0, 2.0);
        assert!(limiter.try_acquire("1.2.3.4").await);
        assert!(limiter.try_acquire("1.2.3.4").await);
        assert!(!limiter.try_acquire("1.2.3.4").await);
    }

    #[tokio::test]
    async fn buckets_are_independent_per_client() {
        let limiter = RateLimiter::new(60.0, 1.0);
        assert!(limiter.try_acquire("a").await);
        assert!(limiter.try_acquire("b").await);
    }
}
