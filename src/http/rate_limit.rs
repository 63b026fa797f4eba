use crate::error::McpError;
use crate::types::RateLimitConfig;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(30_000);

// Absorbs float rounding in `elapsed * rate` after an exact-length wait.
const TOKEN_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    capacity: f64,
    refill_per_second: f64,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        self.last_refill = now;
    }
}

/// Per-key token buckets. Buckets are created lazily and never evicted;
/// the key set is bounded by the tool catalogue.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    max_wait: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WAIT)
    }
}

impl RateLimiter {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            max_wait,
        }
    }

    /// Waits until `amount` tokens can be debited from the bucket for `config.key`.
    ///
    /// Fails fast with a rate-limit error when the total wait would exceed the
    /// configured maximum. The bucket lock is never held across a sleep and
    /// tokens are only debited once they are actually available, so waiters
    /// that lose a race for the refilled tokens sleep again for the remainder.
    pub async fn consume(&self, config: &RateLimitConfig, amount: f64) -> Result<(), McpError> {
        let mut waited = Duration::ZERO;
        loop {
            let wait = {
                let mut buckets = self.buckets.lock();
                let bucket = Self::bucket_for(&mut buckets, config);
                bucket.refill(Instant::now());
                if bucket.tokens + TOKEN_EPSILON >= amount {
                    bucket.tokens = (bucket.tokens - amount).max(0.0);
                    return Ok(());
                }
                let missing = amount - bucket.tokens;
                let wait_ms = if bucket.refill_per_second > 0.0 {
                    (missing / bucket.refill_per_second * 1000.0).ceil()
                } else {
                    f64::INFINITY
                };
                let total_ms = waited.as_millis() as f64 + wait_ms;
                let max_ms = self.max_wait.as_millis();
                if !total_ms.is_finite() || total_ms as u128 > max_ms {
                    return Err(McpError::rate_limit(
                        format!(
                            "Client-side rate limit reached for {}. Required wait {}ms exceeds allowed max {}ms.",
                            config.key, total_ms, max_ms
                        ),
                        Some("Reduce tool call frequency or retry later."),
                    ));
                }
                Duration::from_millis(wait_ms as u64)
            };

            debug!("rate limiter: waiting {:?} for {}", wait, config.key);
            tokio::time::sleep(wait).await;
            waited += wait;
        }
    }

    /// Current token count for `key` after refilling, if the bucket exists.
    pub fn available(&self, key: &str) -> Option<f64> {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.get_mut(key)?;
        bucket.refill(Instant::now());
        Some(bucket.tokens)
    }

    fn bucket_for<'a>(
        buckets: &'a mut HashMap<String, Bucket>,
        config: &RateLimitConfig,
    ) -> &'a mut Bucket {
        let bucket = buckets.entry(config.key.clone()).or_insert_with(|| Bucket {
            tokens: config.capacity,
            last_refill: Instant::now(),
            capacity: config.capacity,
            refill_per_second: config.refill_per_second,
        });
        if bucket.capacity != config.capacity || bucket.refill_per_second != config.refill_per_second
        {
            bucket.capacity = config.capacity;
            bucket.refill_per_second = config.refill_per_second;
            bucket.tokens = bucket.tokens.min(config.capacity);
        }
        bucket
    }
}
