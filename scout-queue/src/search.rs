//! Collaborators the durable queue calls out to: the search routine that runs
//! an agent, and the directory that says which agents are active.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{JobError, QueueResult};

/// Result of one search run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub total_results: u32,
}

/// Runs the web search for one agent. May fail; the queue decides about retries.
#[async_trait]
pub trait SearchExecutor: Send + Sync {
    async fn execute(&self, agent_id: &str) -> Result<SearchOutcome, JobError>;
}

/// Agent together with the topic and user it searches for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub agent_id: String,
    pub topic_id: String,
    pub user_id: String,
}

impl Owner {
    pub fn new(
        agent_id: impl Into<String>,
        topic_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            topic_id: topic_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Lookup of active agents
#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    /// Return the active owners among `agent_ids`; unknown and inactive ids are left out.
    async fn list_active_owners(&self, agent_ids: &[String]) -> QueueResult<Vec<Owner>>;
}

/// In-memory owner directory for tests and demos
#[derive(Default)]
pub struct MemoryDirectory {
    owners: RwLock<HashMap<String, (Owner, bool)>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an owner with its active flag
    pub fn insert(&self, owner: Owner, active: bool) {
        self.owners
            .write()
            .insert(owner.agent_id.clone(), (owner, active));
    }

    pub fn with_active(self, owners: impl IntoIterator<Item = Owner>) -> Self {
        for owner in owners {
            self.insert(owner, true);
        }
        self
    }

    pub fn set_active(&self, agent_id: &str, active: bool) -> bool {
        match self.owners.write().get_mut(agent_id) {
            Some(entry) => {
                entry.1 = active;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl OwnerDirectory for MemoryDirectory {
    async fn list_active_owners(&self, agent_ids: &[String]) -> QueueResult<Vec<Owner>> {
        let owners = self.owners.read();

        Ok(agent_ids
            .iter()
            .filter_map(|id| owners.get(id))
            .filter(|(_, active)| *active)
            .map(|(owner, _)| owner.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_filters_inactive_and_unknown() {
        let directory = MemoryDirectory::new().with_active(vec![
            Owner::new("agent-1", "topic-1", "user-1"),
            Owner::new("agent-2", "topic-2", "user-1"),
        ]);
        directory.set_active("agent-2", false);

        let ids = vec!["agent-1".to_string(), "agent-2".to_string(), "ghost".to_string()];
        let owners = directory.list_active_owners(&ids).await.unwrap();

        assert_eq!(owners, vec![Owner::new("agent-1", "topic-1", "user-1")]);
        assert!(!directory.set_active("ghost", true));
    }
}
