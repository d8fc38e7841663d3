use tokio::time::Instant;

/// The refill rate and capacity of a [`RateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterConfig {
    /// The tokens refilled per second.
    pub rate: f64,
    /// The maximum number of tokens held.
    pub burst: u64,
}

impl LimiterConfig {
    /// Returns a new [`LimiterConfig`].
    pub const fn new(rate: f64, burst: u64) -> Self {
        Self { rate, burst }
    }
}

/// A token bucket refilled continuously at a fixed rate.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    rate: f64,
    burst: u64,
    tokens: f64,
    last: Instant,
}

impl RateLimiter {
    /// Returns a full [`RateLimiter`].
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            rate: config.rate,
            burst: config.burst,
            tokens: config.burst as f64,
            last: Instant::now(),
        }
    }

    /// Returns the capacity of the bucket.
    pub const fn burst(&self) -> u64 {
        self.burst
    }

    /// Sets the capacity of the bucket. Raising the capacity fills the bucket up to it, lowering
    /// it drops the tokens above it.
    pub fn set_burst(&mut self, burst: u64) {
        self.refill();
        if burst > self.burst {
            self.tokens = burst as f64;
        } else {
            self.tokens = self.tokens.min(burst as f64);
        }
        self.burst = burst;
    }

    /// Takes `n` tokens if available. Leaves the bucket untouched otherwise.
    pub fn try_acquire(&mut self, n: u64) -> bool {
        self.refill();
        if (n as f64) > self.tokens {
            return false;
        }
        self.tokens -= n as f64;
        true
    }

    /// Takes up to `n` whole tokens and returns how many were taken.
    pub fn try_acquire_up_to(&mut self, n: u64) -> u64 {
        self.refill();
        let taken = n.min(self.tokens.floor() as u64);
        self.tokens -= taken as f64;
        taken
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.tokens = self.rate.mul_add(elapsed, self.tokens).min(self.burst as f64);
        self.last = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_should_refill_over_time() {
        let mut limiter = RateLimiter::new(LimiterConfig::new(10.0, 20));
        assert!(limiter.try_acquire(20));
        assert!(!limiter.try_acquire(1));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.try_acquire(5));
        assert!(!limiter.try_acquire(1));

        // refill never exceeds the burst.
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!limiter.try_acquire(21));
        assert!(limiter.try_acquire(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_inflate_and_restore_burst() {
        let mut limiter = RateLimiter::new(LimiterConfig::new(1.0, 10));
        limiter.set_burst(100);
        assert!(limiter.try_acquire(80));

        limiter.set_burst(10);
        assert_eq!(limiter.burst(), 10);
        assert!(limiter.try_acquire(10));
        assert!(!limiter.try_acquire(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_acquire_partially() {
        let mut limiter = RateLimiter::new(LimiterConfig::new(2.0, 5));
        assert_eq!(limiter.try_acquire_up_to(3), 3);
        assert_eq!(limiter.try_acquire_up_to(10), 2);
        assert_eq!(limiter.try_acquire_up_to(1), 0);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(limiter.try_acquire_up_to(10), 3);
    }
}
