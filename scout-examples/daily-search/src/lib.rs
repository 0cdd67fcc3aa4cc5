//! Composition root for the daily search cycle.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use scout_queue::{
    JobError, MemoryDirectory, MemoryStore, Owner, RateLimitConfig, RateLimitedQueue,
    SearchExecutor, SearchOutcome, SearchQueue, SearchQueueConfig,
};

const DEFAULT_FAILURE_RATE: f64 = 0.2;

/// Stand-in for the LLM web search: random latency, result count and failures
pub struct SimulatedSearch {
    failure_rate: f64,
    latency: Duration,
}

impl SimulatedSearch {
    /// Non-finite rates fall back to the default, others are clamped to `0.0..=1.0`
    pub fn new(failure_rate: f64, latency: Duration) -> Self {
        let failure_rate = if failure_rate.is_finite() {
            failure_rate.clamp(0.0, 1.0)
        } else {
            DEFAULT_FAILURE_RATE
        };

        Self {
            failure_rate,
            latency,
        }
    }
}

#[async_trait]
impl SearchExecutor for SimulatedSearch {
    async fn execute(&self, agent_id: &str) -> Result<SearchOutcome, JobError> {
        tokio::time::sleep(self.latency).await;

        // ThreadRng is not Send; draw before any await
        let (failed, total_results) = {
            let mut rng = rand::thread_rng();
            (rng.gen_bool(self.failure_rate), rng.gen_range(0..20))
        };

        if failed {
            debug!(agent_id, "Simulated search failed");
            return Err(JobError::retryable(format!(
                "simulated provider error for {}",
                agent_id
            )));
        }

        Ok(SearchOutcome { total_results })
    }
}

/// Agent ids from `DAILY_SEARCH_AGENTS` (comma separated), or five demo agents
pub fn agent_ids_from_env() -> Vec<String> {
    match std::env::var("DAILY_SEARCH_AGENTS") {
        Ok(value) if !value.trim().is_empty() => value
            .split(',')
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect(),
        _ => (1..=5).map(|i| format!("agent-{}", i)).collect(),
    }
}

/// Parse `DAILY_SEARCH_FAILURE_RATE`, ignoring unparsable and non-finite values
pub fn parse_failure_rate(raw: Option<&str>) -> f64 {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|rate| rate.is_finite())
        .unwrap_or(DEFAULT_FAILURE_RATE)
}

/// Wire the limiter, store, directory and simulated search into one queue
pub fn build(agent_ids: &[String]) -> SearchQueue<MemoryStore> {
    let failure_rate =
        parse_failure_rate(std::env::var("DAILY_SEARCH_FAILURE_RATE").ok().as_deref());

    let directory = MemoryDirectory::new().with_active(
        agent_ids
            .iter()
            .map(|id| Owner::new(id.as_str(), format!("topic-{}", id), "demo-user")),
    );

    SearchQueue::new(
        MemoryStore::new(),
        Arc::new(directory),
        Arc::new(SimulatedSearch::new(failure_rate, Duration::from_millis(50))),
        RateLimitedQueue::new(RateLimitConfig::from_env()),
    )
    .with_config(SearchQueueConfig::from_env())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_search_never_fails_at_zero_rate() {
        let search = SimulatedSearch::new(0.0, Duration::from_millis(5));

        let outcome = search.execute("agent-1").await.unwrap();
        assert!(outcome.total_results < 20);
    }

    #[tokio::test]
    async fn test_simulated_search_always_fails_at_full_rate() {
        let search = SimulatedSearch::new(1.0, Duration::ZERO);

        let error = search.execute("agent-1").await.unwrap_err();
        assert!(error.is_retryable());
    }

    #[test]
    fn test_failure_rate_ignores_non_finite_values() {
        assert_eq!(parse_failure_rate(Some("0.5")), 0.5);
        assert_eq!(parse_failure_rate(Some("NaN")), DEFAULT_FAILURE_RATE);
        assert_eq!(parse_failure_rate(Some("inf")), DEFAULT_FAILURE_RATE);
        assert_eq!(parse_failure_rate(Some("often")), DEFAULT_FAILURE_RATE);
        assert_eq!(parse_failure_rate(None), DEFAULT_FAILURE_RATE);
    }

    #[tokio::test]
    async fn test_nan_rate_does_not_panic_the_search() {
        let search = SimulatedSearch::new(f64::NAN, Duration::ZERO);
        assert_eq!(search.failure_rate, DEFAULT_FAILURE_RATE);

        // Either outcome is fine; drawing must not panic
        let _ = search.execute("agent-1").await;
    }
}
