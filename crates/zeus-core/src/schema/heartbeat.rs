//! Capability heartbeat records

use super::AgentRole;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Periodic liveness record published by an agent's extension to
/// `zeus-agent-bus/caps/<agent-id>.json`.
///
/// There is no tombstone on exit; staleness is detected purely by the age of
/// `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityHeartbeat {
    pub agent_id: String,
    #[serde(default)]
    pub role: AgentRole,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub session_path: String,
    #[serde(default)]
    pub cwd: String,

    /// Epoch seconds (fractional)
    pub updated_at: f64,

    #[serde(default)]
    pub supports: Supports,
    #[serde(default)]
    pub extension: ExtensionInfo,

    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

/// Feature flags the extension advertises.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Supports {
    #[serde(default)]
    pub queue_bus: bool,
    #[serde(default)]
    pub receipt_v1: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtensionInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}
