//! Envelope: one durable send request

use super::{AgentRole, DeliverAs};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single send request, persisted in
/// `zeus-message-queue/{new,inflight}/<id>.json`.
///
/// The id is stable across the envelope's whole lineage: retries move the
/// same file between `new/` and `inflight/` and rewrite its scheduling
/// fields, they never mint a new id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Message id, unique per envelope lineage (lowercase ULID)
    pub id: String,

    /// Sender identity
    pub source_agent_id: String,
    pub source_name: String,
    #[serde(default)]
    pub source_role: AgentRole,

    /// Sender's address expression: `polemarch`, `phalanx`, `hoplite:<id>`,
    /// `agent:<id>`, `name:<display>`, or a raw display name
    pub target: String,

    /// UTF-8 payload, non-empty after trimming
    pub message: String,

    #[serde(default)]
    pub deliver_as: DeliverAs,

    /// Epoch seconds (fractional)
    pub created_at: f64,
    pub updated_at: f64,

    /// Retry scheduling state
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub next_attempt_at: f64,

    /// Resolved recipient list, cached durably on first success so retries
    /// are stable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipients_resolved: Option<Vec<ResolvedRecipient>>,

    /// Unknown fields for forward compatibility
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

/// One concrete recipient of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRecipient {
    pub agent_id: String,
    pub name: String,
    #[serde(default)]
    pub role: AgentRole,
}

impl Envelope {
    /// Queue file name for this envelope.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.id)
    }

    /// Reject payloads that can never be delivered (the poison class).
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("envelope has empty id".to_string());
        }
        if self.message.trim().is_empty() {
            return Err(format!("envelope {} has empty message", self.id));
        }
        if self.target.trim().is_empty() {
            return Err(format!("envelope {} has empty target", self.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            id: "01hx3q5e8kzr9w7v6t5s4r3q2p".to_string(),
            source_agent_id: "alice".to_string(),
            source_name: "Alice".to_string(),
            source_role: AgentRole::Polemarch,
            target: "name:bob".to_string(),
            message: "hello".to_string(),
            deliver_as: DeliverAs::Steer,
            created_at: 1_754_000_000.25,
            updated_at: 1_754_000_000.25,
            attempts: 0,
            next_attempt_at: 1_754_000_000.25,
            recipients_resolved: None,
            unknown_fields: HashMap::new(),
        }
    }

    #[test]
    fn roundtrip_preserves_unknown_fields() {
        let json = r#"{
            "id": "E1",
            "source_agent_id": "alice",
            "source_name": "Alice",
            "target": "name:bob",
            "message": "hi",
            "created_at": 1.0,
            "updated_at": 1.0,
            "futureFeature": {"nested": true}
        }"#;

        let env: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.attempts, 0);
        assert_eq!(env.deliver_as, DeliverAs::Steer);
        assert!(env.unknown_fields.contains_key("futureFeature"));

        let back = serde_json::to_string(&env).unwrap();
        let reparsed: Envelope = serde_json::from_str(&back).unwrap();
        assert!(reparsed.unknown_fields.contains_key("futureFeature"));
    }

    #[test]
    fn missing_message_fails_to_parse() {
        let json = r#"{"id":"E6"}"#;
        assert!(serde_json::from_str::<Envelope>(json).is_err());
    }

    #[test]
    fn validate_rejects_blank_message() {
        let mut env = sample();
        env.message = "   \n".to_string();
        assert!(env.validate().is_err());
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn cached_resolution_roundtrips() {
        let mut env = sample();
        env.recipients_resolved = Some(vec![ResolvedRecipient {
            agent_id: "bob".to_string(),
            name: "Bob".to_string(),
            role: AgentRole::Hoplite,
        }]);

        let back: Envelope = serde_json::from_str(&serde_json::to_string(&env).unwrap()).unwrap();
        assert_eq!(back.recipients_resolved.unwrap()[0].agent_id, "bob");
    }
}
