use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Sliding record of operation starts used for admission control
#[derive(Debug)]
pub(crate) struct RequestWindow {
    starts: VecDeque<Instant>,
    limit: usize,
    span: Duration,
}

impl RequestWindow {
    /// A limit of zero is raised to one so the window can always open
    pub(crate) fn new(limit: usize, span: Duration) -> Self {
        let limit = limit.max(1);

        Self {
            starts: VecDeque::with_capacity(limit),
            limit,
            span,
        }
    }

    /// Drop starts that fell out of the trailing window
    pub(crate) fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.starts.front() {
            if now.saturating_duration_since(*oldest) >= self.span {
                self.starts.pop_front();
            } else {
                break;
            }
        }
    }

    pub(crate) fn has_capacity(&self) -> bool {
        self.starts.len() < self.limit
    }

    pub(crate) fn record(&mut self, at: Instant) {
        self.starts.push_back(at);
    }

    pub(crate) fn len(&self) -> usize {
        self.starts.len()
    }

    /// Time until the oldest start leaves the window
    pub(crate) fn wait_time(&self, now: Instant) -> Duration {
        self.starts
            .front()
            .map(|oldest| self.span.saturating_sub(now.saturating_duration_since(*oldest)))
            .unwrap_or(Duration::ZERO)
    }
}
