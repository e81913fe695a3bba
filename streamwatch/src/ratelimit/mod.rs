//! Two-layer token bucket rate limiting: a global bucket consulted before a
//! per-platform bucket (falling back to a "default" bucket for unrecognized
//! platforms).

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::Instant as TokioInstant;
use tracing::trace;

pub const DEFAULT_PLATFORM_KEY: &str = "default";

/// Configuration for a single bucket.
#[derive(Debug, Clone)]
pub struct BucketConfig {
    pub capacity: f64,
    pub refill_rate: f64,
}

impl BucketConfig {
    pub fn with_rps(rps: f64) -> Result<Self, crate::Error> {
        if !rps.is_finite() || rps <= 0.0 {
            return Err(crate::Error::validation(format!(
                "rate limit must be a positive finite number, got {rps}"
            )));
        }
        Ok(Self {
            capacity: (rps * 2.0).max(1.0),
            refill_rate: rps,
        })
    }
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            capacity: 15.0,
            refill_rate: 8.0,
        }
    }
}

/// A single token bucket with lazy, on-demand refill.
#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(config: &BucketConfig) -> Self {
        Self {
            tokens: config.capacity,
            capacity: config.capacity,
            refill_rate: config.refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_take(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn wait_for_next(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }
}

/// Configuration for the two-layer limiter.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub enabled: bool,
    pub global: BucketConfig,
    pub platforms: HashMap<String, BucketConfig>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global: BucketConfig::default(),
            platforms: HashMap::new(),
        }
    }
}

/// Global + per-platform token bucket manager.
pub struct RateLimiter {
    config: RateLimiterConfig,
    global: Mutex<Bucket>,
    platform: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let global = Bucket::new(&config.global);
        Self {
            config,
            global: Mutex::new(global),
            platform: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire one token from the global bucket, then one from the
    /// platform bucket, blocking up to `timeout` total. Returns `false` if
    /// the timeout elapses before both tokens are available.
    pub async fn acquire(&self, platform: &str, timeout: Duration) -> bool {
        if !self.config.enabled {
            return true;
        }
        let deadline = TokioInstant::now() + timeout;

        if !self.acquire_bucket_global(deadline).await {
            return false;
        }
        self.acquire_bucket_platform(platform, deadline).await
    }

    /// Non-blocking variant: fails fast if either bucket is empty.
    pub async fn try_acquire(&self, platform: &str) -> bool {
        if !self.config.enabled {
            return true;
        }
        {
            let mut g = self.global.lock().await;
            if !g.try_take() {
                return false;
            }
        }
        let mut p = self.platform.lock().await;
        let bucket = self.get_or_create(&mut p, platform);
        if bucket.try_take() {
            true
        } else {
            // Refund the global token so a platform denial doesn't leak
            // capacity out of the global bucket.
            drop(p);
            let mut g = self.global.lock().await;
            g.tokens = (g.tokens + 1.0).min(g.capacity);
            false
        }
    }

    async fn acquire_bucket_global(&self, deadline: TokioInstant) -> bool {
        loop {
            let wait = {
                let mut g = self.global.lock().await;
                if g.try_take() {
                    return true;
                }
                g.wait_for_next()
            };
            if !self.sleep_until_or_deadline(wait, deadline).await {
                return false;
            }
        }
    }

    async fn acquire_bucket_platform(&self, platform: &str, deadline: TokioInstant) -> bool {
        loop {
            let wait = {
                let mut p = self.platform.lock().await;
                let bucket = self.get_or_create(&mut p, platform);
                if bucket.try_take() {
                    return true;
                }
                bucket.wait_for_next()
            };
            if !self.sleep_until_or_deadline(wait, deadline).await {
                return false;
            }
        }
    }

    async fn sleep_until_or_deadline(&self, wait: Duration, deadline: TokioInstant) -> bool {
        let now = TokioInstant::now();
        if now >= deadline {
            return false;
        }
        let wait = wait.min(deadline.saturating_duration_since(now));
        trace!(?wait, "rate limited, waiting for token");
        tokio::time::sleep(wait).await;
        TokioInstant::now() < deadline
    }

    fn get_or_create<'a>(
        &self,
        buckets: &'a mut HashMap<String, Bucket>,
        platform: &str,
    ) -> &'a mut Bucket {
        match buckets.entry(platform.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let config = self
                    .config
                    .platforms
                    .get(platform)
                    .or_else(|| self.config.platforms.get(DEFAULT_PLATFORM_KEY))
                    .cloned()
                    .unwrap_or_else(|| self.config.global.clone());
                e.insert(Bucket::new(&config))
            }
        }
    }
}
