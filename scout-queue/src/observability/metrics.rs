use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters for durable queue activity
#[derive(Debug, Default)]
pub struct LiveMetrics {
    jobs_enqueued: AtomicU64,
    jobs_claimed: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_retried: AtomicU64,
    drains: AtomicU64,

    // Per-agent metrics
    agent_metrics: RwLock<HashMap<String, AgentMetrics>>,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_jobs_enqueued(&self, agent_id: &str) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
        self.with_agent(agent_id, |m| m.enqueued += 1);
    }

    pub fn increment_jobs_claimed(&self) {
        self.jobs_claimed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_jobs_completed(&self, agent_id: &str, elapsed: Duration) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        self.with_agent(agent_id, |m| {
            m.completed += 1;
            m.search_time += elapsed;
        });
    }

    pub fn increment_jobs_failed(&self, agent_id: &str) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        self.with_agent(agent_id, |m| m.failed += 1);
    }

    pub fn increment_jobs_retried(&self, agent_id: &str) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
        self.with_agent(agent_id, |m| m.retried += 1);
    }

    pub fn increment_drains(&self) {
        self.drains.fetch_add(1, Ordering::Relaxed);
    }

    fn with_agent(&self, agent_id: &str, update: impl FnOnce(&mut AgentMetrics)) {
        let mut agents = self.agent_metrics.write();
        update(agents.entry(agent_id.to_string()).or_default());
    }

    pub fn jobs_enqueued(&self) -> u64 {
        self.jobs_enqueued.load(Ordering::Relaxed)
    }

    pub fn jobs_claimed(&self) -> u64 {
        self.jobs_claimed.load(Ordering::Relaxed)
    }

    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    pub fn jobs_retried(&self) -> u64 {
        self.jobs_retried.load(Ordering::Relaxed)
    }

    pub fn drains(&self) -> u64 {
        self.drains.load(Ordering::Relaxed)
    }

    /// Metrics for one agent
    pub fn agent_metrics(&self, agent_id: &str) -> Option<AgentMetrics> {
        self.agent_metrics.read().get(agent_id).cloned()
    }

    /// Point-in-time copy of the global counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_enqueued: self.jobs_enqueued(),
            jobs_claimed: self.jobs_claimed(),
            jobs_completed: self.jobs_completed(),
            jobs_failed: self.jobs_failed(),
            jobs_retried: self.jobs_retried(),
            drains: self.drains(),
        }
    }
}

/// Metrics for a single agent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentMetrics {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    /// Total time spent in successful searches
    pub search_time: Duration,
}

impl AgentMetrics {
    /// Calculate success rate as percentage
    pub fn success_rate(&self) -> f64 {
        rate(self.completed, self.completed + self.failed, 100.0)
    }

    /// Average duration of a successful search
    pub fn average_search_time(&self) -> Option<Duration> {
        if self.completed == 0 {
            None
        } else {
            Some(self.search_time / self.completed as u32)
        }
    }
}

/// Global counters at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub jobs_enqueued: u64,
    pub jobs_claimed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_retried: u64,
    pub drains: u64,
}

impl MetricsSnapshot {
    /// Calculate overall success rate
    pub fn success_rate(&self) -> f64 {
        rate(self.jobs_completed, self.jobs_completed + self.jobs_failed, 100.0)
    }

    /// Calculate overall retry rate
    pub fn retry_rate(&self) -> f64 {
        rate(self.jobs_retried, self.jobs_enqueued, 0.0)
    }

    /// Enqueued jobs not yet terminal
    pub fn jobs_in_progress(&self) -> u64 {
        self.jobs_enqueued
            .saturating_sub(self.jobs_completed + self.jobs_failed)
    }
}

fn rate(part: u64, whole: u64, empty: f64) -> f64 {
    if whole == 0 {
        empty
    } else {
        (part as f64 / whole as f64) * 100.0
    }
}
