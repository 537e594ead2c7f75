//! Recipient resolution: target expression to concrete agent ids.
//!
//! Address forms, matched in order:
//!
//! - `agent:<id>` / `hoplite:<id>`: direct id lookup
//! - `polemarch`: the sender's parent
//! - `phalanx`: every member of the sender's phalanx except the sender
//! - `name:<display>` or a raw display name: case-insensitive exact match
//!
//! Resolution is deterministic over the registry snapshot; the dispatcher
//! caches the first successful result on the envelope so retries are stable.

use crate::registry::{AgentInfo, AgentRegistry};
use thiserror::Error;
use zeus_core::agent_id::canonical_non_empty;
use zeus_core::schema::{Envelope, ResolvedRecipient};

/// Resolution failures. All keep the envelope queued and retrying; all are
/// structural, so they notify force-visible on first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("ambiguous recipient: {0} matches {1} agents")]
    AmbiguousRecipient(String, usize),

    #[error("sender {0} has no parent to address as polemarch")]
    MissingParent(String),

    #[error("sender {0} has no phalanx members to address")]
    MissingPhalanx(String),
}

impl ResolveError {
    /// Stable kind string used for notification throttling keys.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownRecipient(..) => "UnknownRecipient",
            Self::AmbiguousRecipient(..) => "AmbiguousRecipient",
            Self::MissingParent(..) => "MissingParent",
            Self::MissingPhalanx(..) => "MissingPhalanx",
        }
    }
}

fn to_recipient(agent: AgentInfo) -> ResolvedRecipient {
    ResolvedRecipient {
        agent_id: agent.agent_id,
        name: agent.name,
        role: agent.role,
    }
}

/// Resolve the envelope's target expression against the registry.
pub fn resolve_recipients(
    envelope: &Envelope,
    registry: &dyn AgentRegistry,
) -> Result<Vec<ResolvedRecipient>, ResolveError> {
    let target = envelope.target.trim();

    if let Some(id) = target.strip_prefix("agent:").or_else(|| target.strip_prefix("hoplite:")) {
        return resolve_by_id(id, registry);
    }

    match target {
        "polemarch" => resolve_parent(&envelope.source_agent_id, registry),
        "phalanx" => resolve_phalanx(&envelope.source_agent_id, registry),
        _ => {
            let name = target.strip_prefix("name:").unwrap_or(target);
            resolve_by_name(name, registry)
        }
    }
}

fn resolve_by_id(
    raw_id: &str,
    registry: &dyn AgentRegistry,
) -> Result<Vec<ResolvedRecipient>, ResolveError> {
    let id = canonical_non_empty(raw_id)
        .ok_or_else(|| ResolveError::UnknownRecipient(raw_id.to_string()))?;
    registry
        .lookup_by_id(&id)
        .map(|a| vec![to_recipient(a)])
        .ok_or(ResolveError::UnknownRecipient(id))
}

fn resolve_by_name(
    name: &str,
    registry: &dyn AgentRegistry,
) -> Result<Vec<ResolvedRecipient>, ResolveError> {
    let matches = registry.lookup_by_name(name);
    match matches.len() {
        0 => Err(ResolveError::UnknownRecipient(name.to_string())),
        1 => Ok(vec![to_recipient(matches.into_iter().next().unwrap())]),
        n => Err(ResolveError::AmbiguousRecipient(name.to_string(), n)),
    }
}

fn resolve_parent(
    sender_id: &str,
    registry: &dyn AgentRegistry,
) -> Result<Vec<ResolvedRecipient>, ResolveError> {
    registry
        .parent_of(sender_id)
        .map(|a| vec![to_recipient(a)])
        .ok_or_else(|| ResolveError::MissingParent(sender_id.to_string()))
}

fn resolve_phalanx(
    sender_id: &str,
    registry: &dyn AgentRegistry,
) -> Result<Vec<ResolvedRecipient>, ResolveError> {
    let sender = registry
        .lookup_by_id(sender_id)
        .ok_or_else(|| ResolveError::MissingPhalanx(sender_id.to_string()))?;
    let phalanx_id = sender
        .phalanx_id
        .ok_or_else(|| ResolveError::MissingPhalanx(sender_id.to_string()))?;

    let members: Vec<ResolvedRecipient> = registry
        .list_phalanx(&phalanx_id)
        .into_iter()
        .filter(|a| a.agent_id != sender_id)
        .map(to_recipient)
        .collect();

    if members.is_empty() {
        return Err(ResolveError::MissingPhalanx(sender_id.to_string()));
    }
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use std::collections::HashMap;
    use zeus_core::schema::{AgentRole, DeliverAs};

    fn envelope_from(source: &str, target: &str) -> Envelope {
        Envelope {
            id: "E1".to_string(),
            source_agent_id: source.to_string(),
            source_name: source.to_string(),
            source_role: AgentRole::Hippeus,
            target: target.to_string(),
            message: "hi".to_string(),
            deliver_as: DeliverAs::Steer,
            created_at: 1.0,
            updated_at: 1.0,
            attempts: 0,
            next_attempt_at: 1.0,
            recipients_resolved: None,
            unknown_fields: HashMap::new(),
        }
    }

    fn fleet() -> InMemoryRegistry {
        let registry = InMemoryRegistry::new();
        registry.upsert(AgentInfo {
            agent_id: "p1".to_string(),
            name: "Polemarch".to_string(),
            role: AgentRole::Polemarch,
            phalanx_id: Some("X".to_string()),
            parent_id: None,
        });
        for id in ["h1", "h2"] {
            registry.upsert(AgentInfo {
                agent_id: id.to_string(),
                name: format!("Hoplite {id}"),
                role: AgentRole::Hoplite,
                phalanx_id: Some("X".to_string()),
                parent_id: Some("p1".to_string()),
            });
        }
        registry.upsert(AgentInfo {
            agent_id: "bob".to_string(),
            name: "Bob".to_string(),
            role: AgentRole::Hippeus,
            phalanx_id: None,
            parent_id: None,
        });
        registry
    }

    #[test]
    fn agent_prefix_resolves_by_id() {
        let registry = fleet();
        let resolved =
            resolve_recipients(&envelope_from("bob", "agent:h1"), &registry).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].agent_id, "h1");

        let resolved =
            resolve_recipients(&envelope_from("bob", "hoplite:h2"), &registry).unwrap();
        assert_eq!(resolved[0].agent_id, "h2");
    }

    #[test]
    fn unknown_id_fails() {
        let registry = fleet();
        let err = resolve_recipients(&envelope_from("bob", "agent:ghost"), &registry).unwrap_err();
        assert_eq!(err.kind(), "UnknownRecipient");
    }

    #[test]
    fn bare_name_and_name_prefix_match_case_insensitively() {
        let registry = fleet();
        for target in ["Bob", "name:bob", "BOB"] {
            let resolved = resolve_recipients(&envelope_from("h1", target), &registry).unwrap();
            assert_eq!(resolved[0].agent_id, "bob", "target {target}");
        }
    }

    #[test]
    fn duplicate_names_are_ambiguous() {
        let registry = fleet();
        registry.upsert(AgentInfo {
            agent_id: "bob2".to_string(),
            name: "bob".to_string(),
            role: AgentRole::Hippeus,
            phalanx_id: None,
            parent_id: None,
        });

        let err = resolve_recipients(&envelope_from("h1", "name:Bob"), &registry).unwrap_err();
        assert!(matches!(err, ResolveError::AmbiguousRecipient(_, 2)));
    }

    #[test]
    fn polemarch_resolves_sender_parent() {
        let registry = fleet();
        let resolved = resolve_recipients(&envelope_from("h1", "polemarch"), &registry).unwrap();
        assert_eq!(resolved[0].agent_id, "p1");

        let err = resolve_recipients(&envelope_from("bob", "polemarch"), &registry).unwrap_err();
        assert_eq!(err.kind(), "MissingParent");
    }

    #[test]
    fn phalanx_excludes_sender() {
        let registry = fleet();
        let resolved = resolve_recipients(&envelope_from("h1", "phalanx"), &registry).unwrap();
        let ids: Vec<&str> = resolved.iter().map(|r| r.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["h2", "p1"]);

        // The polemarch fanning out reaches both hoplites.
        let resolved = resolve_recipients(&envelope_from("p1", "phalanx"), &registry).unwrap();
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn lone_agent_has_no_phalanx() {
        let registry = fleet();
        let err = resolve_recipients(&envelope_from("bob", "phalanx"), &registry).unwrap_err();
        assert_eq!(err.kind(), "MissingPhalanx");
    }
}
