//! Per-recipient inbox item

use super::{AgentRole, DeliverAs};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The per-recipient materialised copy of an envelope, written by the
/// dispatcher to `zeus-agent-bus/inbox/<agent-id>/new/<id>.json` and claimed
/// by that agent's extension into `processing/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxItem {
    /// Mirrors the envelope id, scoped per recipient
    pub id: String,

    pub message: String,
    #[serde(default)]
    pub deliver_as: DeliverAs,

    pub source_name: String,
    pub source_agent_id: String,
    #[serde(default)]
    pub source_role: AgentRole,

    /// Epoch seconds (fractional)
    pub created_at: f64,

    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

impl InboxItem {
    pub fn file_name(&self) -> String {
        format!("{}.json", self.id)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("inbox item has empty id".to_string());
        }
        if self.message.trim().is_empty() {
            return Err(format!("inbox item {} has empty message", self.id));
        }
        Ok(())
    }
}
