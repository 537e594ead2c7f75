//! Agent registry boundary.
//!
//! Discovery and identity assignment live outside the bus; the dispatcher
//! only consumes this read interface. [`InMemoryRegistry`] is the in-repo
//! implementation, populated programmatically or from a roster snapshot the
//! discovery layer drops into the state directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use zeus_core::schema::AgentRole;

/// One known agent, as the discovery layer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_id: String,
    pub name: String,
    #[serde(default)]
    pub role: AgentRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phalanx_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Read interface supplied by the discovery subsystem.
pub trait AgentRegistry: Send + Sync {
    fn lookup_by_id(&self, agent_id: &str) -> Option<AgentInfo>;

    /// Case-insensitive exact match on display name; may return several.
    fn lookup_by_name(&self, name: &str) -> Vec<AgentInfo>;

    fn list_phalanx(&self, phalanx_id: &str) -> Vec<AgentInfo>;

    fn parent_of(&self, agent_id: &str) -> Option<AgentInfo>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RosterFile {
    #[serde(default)]
    agents: Vec<AgentInfo>,
}

/// Registry backed by an in-process map.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    agents: RwLock<HashMap<String, AgentInfo>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a roster snapshot (`{"agents": [...]}`) written by the discovery
    /// layer.
    pub fn load_roster(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read roster at {}", path.display()))?;
        let roster: RosterFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse roster at {}", path.display()))?;

        let registry = Self::new();
        for agent in roster.agents {
            registry.upsert(agent);
        }
        Ok(registry)
    }

    pub fn upsert(&self, agent: AgentInfo) {
        self.agents.write().unwrap().insert(agent.agent_id.clone(), agent);
    }

    pub fn remove(&self, agent_id: &str) {
        self.agents.write().unwrap().remove(agent_id);
    }

    pub fn len(&self) -> usize {
        self.agents.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().unwrap().is_empty()
    }
}

impl AgentRegistry for InMemoryRegistry {
    fn lookup_by_id(&self, agent_id: &str) -> Option<AgentInfo> {
        self.agents.read().unwrap().get(agent_id).cloned()
    }

    fn lookup_by_name(&self, name: &str) -> Vec<AgentInfo> {
        let wanted = name.to_lowercase();
        let mut matches: Vec<AgentInfo> = self
            .agents
            .read()
            .unwrap()
            .values()
            .filter(|a| a.name.to_lowercase() == wanted)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        matches
    }

    fn list_phalanx(&self, phalanx_id: &str) -> Vec<AgentInfo> {
        let mut members: Vec<AgentInfo> = self
            .agents
            .read()
            .unwrap()
            .values()
            .filter(|a| a.phalanx_id.as_deref() == Some(phalanx_id))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        members
    }

    fn parent_of(&self, agent_id: &str) -> Option<AgentInfo> {
        let agents = self.agents.read().unwrap();
        let parent_id = agents.get(agent_id)?.parent_id.clone()?;
        agents.get(&parent_id).cloned()
    }
}
