pub mod ids;
pub mod record;
pub mod events;
pub mod stats;

pub use ids::{JobId, EntryId};
pub use record::{SearchJob, SearchJobStatus, FailureDisposition};
pub use events::JobEvent;
pub use stats::{QueueStatus, QueueStats, ItemOutcome, ProcessSummary, JobFilter, CycleReport};
