use chrono::Utc;
use rand::distributions::Uniform;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a durable search job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new unique job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a job ID from a string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Identifier of an in-process queue entry: `{owner}-{unix_millis}-{suffix}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryId(String);

impl EntryId {
    /// Mint a fresh id for an entry submitted by `owner_id`
    pub fn new(owner_id: &str) -> Self {
        let mut rng = rand::thread_rng();
        let alphabet = Uniform::from(0..BASE36.len());
        let suffix: String = (0..9)
            .map(|_| BASE36[rng.sample(alphabet)] as char)
            .collect();

        Self(format!("{}-{}-{}", owner_id, Utc::now().timestamp_millis(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_entry_id_shape() {
        let id = EntryId::new("agent-u1-t1");
        let suffix = id.as_str().rsplit('-').next().unwrap();

        assert!(id.as_str().starts_with("agent-u1-t1-"));
        assert_eq!(suffix.len(), 9);
        assert!(suffix.bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn test_entry_ids_are_not_reused() {
        let ids: HashSet<_> = (0..1000).map(|_| EntryId::new("owner")).collect();
        assert_eq!(ids.len(), 1000);
    }
}
