use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the in-process rate-limited queue
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum operation starts inside one window
    pub max_requests_per_window: usize,
    /// Length of the trailing admission window
    pub window: Duration,
    /// Extra sleep added when waiting for the window to open
    pub wait_buffer: Duration,
    /// Delay before the first retry
    pub base_backoff: Duration,
    /// Upper bound on any retry delay
    pub max_backoff: Duration,
    /// Retry ceiling used by `RateLimitedQueue::add`
    pub default_max_retries: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 60,
            window: Duration::from_secs(60),
            wait_buffer: Duration::from_millis(100),
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            default_max_retries: 3,
        }
    }
}

impl RateLimitConfig {
    /// Build from `SCOUT_LIMITER_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_requests_per_window: env_or(
                "SCOUT_LIMITER_MAX_REQUESTS",
                defaults.max_requests_per_window,
            ),
            window: Duration::from_millis(env_or(
                "SCOUT_LIMITER_WINDOW_MS",
                defaults.window.as_millis() as u64,
            )),
            wait_buffer: Duration::from_millis(env_or(
                "SCOUT_LIMITER_WAIT_BUFFER_MS",
                defaults.wait_buffer.as_millis() as u64,
            )),
            base_backoff: Duration::from_millis(env_or(
                "SCOUT_LIMITER_BASE_BACKOFF_MS",
                defaults.base_backoff.as_millis() as u64,
            )),
            max_backoff: Duration::from_millis(env_or(
                "SCOUT_LIMITER_MAX_BACKOFF_MS",
                defaults.max_backoff.as_millis() as u64,
            )),
            default_max_retries: env_or("SCOUT_LIMITER_MAX_RETRIES", defaults.default_max_retries),
        }
    }

    /// Backoff before the attempt following the `retry_count`-th failure:
    /// `min(base * 2^(retry_count - 1), max)`.
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(31);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Configuration for the durable search-job queue
#[derive(Debug, Clone)]
pub struct SearchQueueConfig {
    /// Items drained per minute by the pacing loop
    pub rate_limit_per_minute: u32,
    /// Retry ceiling written into every new record
    pub max_retries: u32,
    /// Retries granted to each search inside the rate-limited queue
    pub search_retries: u32,
    /// Age after which completed records may be purged
    pub retention_days: u32,
    /// Log drain progress every this many items
    pub progress_every: usize,
}

impl Default for SearchQueueConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 60,
            max_retries: 3,
            search_retries: 1,
            retention_days: 7,
            progress_every: 10,
        }
    }
}

impl SearchQueueConfig {
    /// Build from `SCOUT_QUEUE_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            rate_limit_per_minute: env_or("SCOUT_QUEUE_RATE_LIMIT", defaults.rate_limit_per_minute),
            max_retries: env_or("SCOUT_QUEUE_MAX_RETRIES", defaults.max_retries),
            search_retries: env_or("SCOUT_QUEUE_SEARCH_RETRIES", defaults.search_retries),
            retention_days: env_or("SCOUT_QUEUE_RETENTION_DAYS", defaults.retention_days),
            progress_every: env_or("SCOUT_QUEUE_PROGRESS_EVERY", defaults.progress_every),
        }
    }

    /// Minimum wall time one drained item occupies
    pub fn pacing_interval(&self) -> Duration {
        Duration::from_millis(60_000 / u64::from(self.rate_limit_per_minute.max(1)))
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_backoff_sequence() {
        let config = RateLimitConfig::default();

        assert_eq!(config.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(config.backoff_delay(5), Duration::from_secs(16));
        assert_eq!(config.backoff_delay(6), Duration::from_secs(30));
        assert_eq!(config.backoff_delay(40), Duration::from_secs(30));
    }

    #[test]
    fn test_pacing_interval() {
        let config = SearchQueueConfig::default();
        assert_eq!(config.pacing_interval(), Duration::from_millis(1000));

        let zero = SearchQueueConfig {
            rate_limit_per_minute: 0,
            ..SearchQueueConfig::default()
        };
        assert_eq!(zero.pacing_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_env_overrides_and_fallbacks() {
        env::set_var("SCOUT_QUEUE_RATE_LIMIT", "120");
        env::set_var("SCOUT_QUEUE_MAX_RETRIES", "not-a-number");

        let config = SearchQueueConfig::from_env();
        assert_eq!(config.rate_limit_per_minute, 120);
        assert_eq!(config.max_retries, 3);

        env::remove_var("SCOUT_QUEUE_RATE_LIMIT");
        env::remove_var("SCOUT_QUEUE_MAX_RETRIES");
    }

    proptest! {
        #[test]
        fn backoff_is_monotonic_and_capped(retry_count in 1u32..200) {
            let config = RateLimitConfig::default();
            let current = config.backoff_delay(retry_count);
            let next = config.backoff_delay(retry_count + 1);

            prop_assert!(current <= next);
            prop_assert!(next <= config.max_backoff);
            prop_assert!(current >= config.base_backoff.min(config.max_backoff));
        }
    }
}
