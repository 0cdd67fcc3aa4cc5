pub mod analytics;
pub mod metrics;
#[cfg(feature = "tracing-basic")]
pub mod tracing;

pub use analytics::ObservabilityLayer;
pub use metrics::{AgentMetrics, LiveMetrics, MetricsSnapshot};

#[cfg(feature = "tracing-basic")]
pub use self::tracing::{init_tracing, LogFormat};
