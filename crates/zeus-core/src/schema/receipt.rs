//! Accepted receipt emitted by the extension

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const RECEIPT_STATUS_ACCEPTED: &str = "accepted";

/// Durable acknowledgement that a message id was handed to the local agent
/// runtime. Written to `zeus-agent-bus/receipts/<agent-id>/<id>.json` after
/// the processed ledger, so a receipt implies a ledger entry.
///
/// "Accepted" means handed to the model, not acted upon; application-level
/// completion is out of the bus's contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub status: String,
    /// Epoch seconds (fractional)
    pub accepted_at: f64,
    pub agent_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub session_path: String,

    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

impl Receipt {
    pub fn accepted(
        id: impl Into<String>,
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
        session_path: impl Into<String>,
        accepted_at: f64,
    ) -> Self {
        Self {
            id: id.into(),
            status: RECEIPT_STATUS_ACCEPTED.to_string(),
            accepted_at,
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            session_path: session_path.into(),
            unknown_fields: HashMap::new(),
        }
    }
}
