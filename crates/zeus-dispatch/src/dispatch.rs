//! One dispatch pass over a claimed envelope.
//!
//! Called by the drain loop while the envelope file sits in `inflight/`.
//! Per-recipient side effects (inbox writes, dedup markers) happen here; the
//! envelope file transitions (delete / rewrite-and-requeue) are applied by
//! the caller from the returned [`Decision`].
//!
//! The `(envelope id, recipient id)` pair is the idempotency key across the
//! whole system: an inbox item is written at most once per pair, a dedup
//! marker is written once the receipt has been observed, and a marked pair is
//! never revisited even after receipts age out upstream.

use crate::notify::NotifyLevel;
use crate::queue;
use crate::resolve::{ResolveError, resolve_recipients};
use crate::retry::RetryPolicy;
use crate::world::World;
use std::time::Duration;
use tracing::{debug, warn};
use zeus_core::caps;
use zeus_core::clock::epoch_now;
use zeus_core::schema::{Envelope, InboxItem, ResolvedRecipient};
use zeus_core::store;

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Every resolved recipient has a receipt (or marker); remove the envelope.
    Complete,
    /// At least one recipient is pending; requeue after `delay`.
    Retry { delay: Duration, reason: String },
    /// The payload can never be delivered; delete it.
    Poison,
}

/// Dispatch a claimed envelope once.
pub fn dispatch_once(world: &World, envelope: &mut Envelope) -> Decision {
    if let Err(reason) = envelope.validate() {
        world.notify_throttled(
            &envelope.id,
            "Poison",
            NotifyLevel::ForceVisible,
            &format!("dropping poison envelope: {reason}"),
        );
        return Decision::Poison;
    }

    let now = epoch_now();
    let policy = RetryPolicy::new(world.tunables.retry_base, world.tunables.retry_cap);

    let recipients = match current_recipients(world, envelope, now) {
        Ok(recipients) => recipients,
        Err(err) => {
            // Structural: force-visible on first occurrence, throttled after.
            world.notify_throttled(
                &envelope.id,
                err.kind(),
                NotifyLevel::ForceVisible,
                &format!("envelope {} undeliverable: {err}", envelope.id),
            );
            return Decision::Retry {
                delay: policy.delay(envelope.attempts),
                reason: err.kind().to_string(),
            };
        }
    };

    let mut blocking: Option<(String, String)> = None;
    for recipient in &recipients {
        match check_recipient(world, envelope, recipient, now) {
            RecipientState::Complete => {}
            RecipientState::Pending { reason, detail } => {
                blocking.get_or_insert((reason, detail));
            }
        }
    }

    match blocking {
        None => {
            debug!("envelope {} complete for {} recipient(s)", envelope.id, recipients.len());
            Decision::Complete
        }
        Some((reason, detail)) => {
            // Non-structural reasons only notify once the envelope has been
            // blocked across several attempts.
            if envelope.attempts + 1 >= world.tunables.attempts_notify {
                world.notify_throttled(
                    &envelope.id,
                    &reason,
                    NotifyLevel::Warning,
                    &format!(
                        "envelope {} still blocked after {} attempts: {detail}",
                        envelope.id,
                        envelope.attempts + 1
                    ),
                );
            }
            Decision::Retry { delay: policy.delay(envelope.attempts), reason }
        }
    }
}

enum RecipientState {
    Complete,
    Pending { reason: String, detail: String },
}

fn check_recipient(
    world: &World,
    envelope: &Envelope,
    recipient: &ResolvedRecipient,
    now: f64,
) -> RecipientState {
    let agent_id = &recipient.agent_id;

    // 1. Already observed complete on a prior pass.
    let marker = world.state.receipt_seen_marker(agent_id, &envelope.id);
    if marker.exists() {
        return RecipientState::Complete;
    }

    // 2. Receipt present: record it durably so upstream can age receipts out.
    if world.state.receipt_path(agent_id, &envelope.id).exists() {
        if let Err(e) = store::write_marker(&marker) {
            warn!("dedup marker for ({agent_id}, {}) failed: {e}", envelope.id);
        }
        return RecipientState::Complete;
    }

    // 3. Capability gate. An already-written inbox item stays put; it will be
    //    consumed once the extension comes back.
    if !caps::is_fresh(&world.state, agent_id, world.tunables.max_heartbeat_age, now) {
        return RecipientState::Pending {
            reason: "StaleCapability".to_string(),
            detail: format!("no fresh capability heartbeat from {agent_id}"),
        };
    }

    // 4. Ensure the inbox item exists; idempotent per (envelope, recipient).
    let new_path = world.state.inbox_new(agent_id).join(envelope.file_name());
    let processing_path = world.state.inbox_processing(agent_id).join(envelope.file_name());
    if !new_path.exists() && !processing_path.exists() {
        let item = InboxItem {
            id: envelope.id.clone(),
            message: envelope.message.clone(),
            deliver_as: envelope.deliver_as,
            source_name: envelope.source_name.clone(),
            source_agent_id: envelope.source_agent_id.clone(),
            source_role: envelope.source_role,
            created_at: envelope.created_at,
            unknown_fields: Default::default(),
        };
        let write = store::ensure_dir(&world.state.inbox_new(agent_id))
            .and_then(|()| store::ensure_dir(&world.state.inbox_processing(agent_id)))
            .and_then(|()| store::write_json_atomic(&new_path, &item));
        if let Err(e) = write {
            warn!("inbox write for ({agent_id}, {}) failed: {e}", envelope.id);
            return RecipientState::Pending {
                reason: "IO".to_string(),
                detail: format!("inbox write for {agent_id} failed"),
            };
        }
        debug!("inbox item ({agent_id}, {}) written", envelope.id);
    }

    RecipientState::Pending {
        reason: "AwaitingReceipt".to_string(),
        detail: format!("awaiting receipt from {agent_id}"),
    }
}

/// Cached resolution, re-run on the re-resolve window.
///
/// Once an envelope has been queued longer than `reresolve_after`, resolution
/// re-runs so membership changes are picked up; recipients that already
/// completed are kept even if they left the registry, so finished work is
/// never un-counted.
fn current_recipients(
    world: &World,
    envelope: &mut Envelope,
    now: f64,
) -> Result<Vec<ResolvedRecipient>, ResolveError> {
    let stale = now - envelope.created_at > world.tunables.reresolve_after.as_secs_f64();

    if let Some(cached) = envelope.recipients_resolved.clone()
        && !stale
    {
        return Ok(cached);
    }

    match resolve_recipients(envelope, world.registry.as_ref()) {
        Ok(fresh) => {
            let merged = merge_with_completed(world, envelope, fresh);
            envelope.recipients_resolved = Some(merged.clone());
            if let Err(e) = queue::persist_resolution(&world.state, envelope) {
                // Retries will re-resolve; only stability is lost.
                warn!("caching resolution for {} failed: {e}", envelope.id);
            }
            Ok(merged)
        }
        Err(err) => match envelope.recipients_resolved.clone() {
            // A failed re-resolve never discards a working cache.
            Some(cached) => Ok(cached),
            None => Err(err),
        },
    }
}

fn merge_with_completed(
    world: &World,
    envelope: &Envelope,
    fresh: Vec<ResolvedRecipient>,
) -> Vec<ResolvedRecipient> {
    let mut merged = fresh;
    if let Some(previous) = &envelope.recipients_resolved {
        for recipient in previous {
            let done = world
                .state
                .receipt_seen_marker(&recipient.agent_id, &envelope.id)
                .exists()
                || world
                    .state
                    .receipt_path(&recipient.agent_id, &envelope.id)
                    .exists();
            if done && !merged.iter().any(|r| r.agent_id == recipient.agent_id) {
                merged.push(recipient.clone());
            }
        }
    }
    merged.dedup_by(|a, b| a.agent_id == b.agent_id);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::registry::{AgentInfo, InMemoryRegistry};
    use crate::world::Tunables;
    use std::sync::Arc;
    use tempfile::TempDir;
    use zeus_core::schema::{AgentRole, CapabilityHeartbeat, DeliverAs, ExtensionInfo, Receipt, Supports};
    use zeus_core::state_dir::StateDir;

    struct Fixture {
        _tmp: TempDir,
        world: World,
        registry: Arc<InMemoryRegistry>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let state = StateDir::at(tmp.path());
        state.ensure_layout().unwrap();
        let registry = Arc::new(InMemoryRegistry::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let world = World::new(
            state,
            Tunables::default(),
            registry.clone(),
            notifier.clone(),
        );
        Fixture { _tmp: tmp, world, registry, notifier }
    }

    fn add_agent(registry: &InMemoryRegistry, id: &str, name: &str) {
        registry.upsert(AgentInfo {
            agent_id: id.to_string(),
            name: name.to_string(),
            role: AgentRole::Hippeus,
            phalanx_id: None,
            parent_id: None,
        });
    }

    fn fresh_caps(world: &World, agent_id: &str) {
        caps::publish_heartbeat(&world.state, &CapabilityHeartbeat {
            agent_id: agent_id.to_string(),
            role: AgentRole::Hippeus,
            session_id: "s".to_string(),
            session_path: "/tmp/s".to_string(),
            cwd: "/tmp".to_string(),
            updated_at: epoch_now(),
            supports: Supports { queue_bus: true, receipt_v1: true },
            extension: ExtensionInfo::default(),
            unknown_fields: Default::default(),
        })
        .unwrap();
    }

    fn envelope(id: &str, target: &str) -> Envelope {
        let now = epoch_now();
        Envelope {
            id: id.to_string(),
            source_agent_id: "alice".to_string(),
            source_name: "Alice".to_string(),
            source_role: AgentRole::Hippeus,
            target: target.to_string(),
            message: "hello".to_string(),
            deliver_as: DeliverAs::Steer,
            created_at: now,
            updated_at: now,
            attempts: 0,
            next_attempt_at: now,
            recipients_resolved: None,
            unknown_fields: Default::default(),
        }
    }

    fn write_receipt(world: &World, agent_id: &str, id: &str) {
        store::ensure_dir(&world.state.receipts_dir(agent_id)).unwrap();
        store::write_json_atomic(
            &world.state.receipt_path(agent_id, id),
            &Receipt::accepted(id, agent_id, "s", "/tmp/s", epoch_now()),
        )
        .unwrap();
    }

    #[test]
    fn fresh_recipient_gets_inbox_item_and_pends() {
        let f = fixture();
        add_agent(&f.registry, "bob", "Bob");
        fresh_caps(&f.world, "bob");

        let mut env = envelope("E1", "name:bob");
        let decision = dispatch_once(&f.world, &mut env);

        assert!(matches!(decision, Decision::Retry { ref reason, .. } if reason == "AwaitingReceipt"));
        assert!(f.world.state.inbox_new("bob").join("E1.json").exists());
        // Resolution was cached.
        assert_eq!(env.recipients_resolved.as_ref().unwrap()[0].agent_id, "bob");
    }

    #[test]
    fn receipt_completes_and_writes_marker() {
        let f = fixture();
        add_agent(&f.registry, "bob", "Bob");
        fresh_caps(&f.world, "bob");
        write_receipt(&f.world, "bob", "E1");

        let mut env = envelope("E1", "name:bob");
        assert_eq!(dispatch_once(&f.world, &mut env), Decision::Complete);
        assert!(f.world.state.receipt_seen_marker("bob", "E1").exists());
    }

    #[test]
    fn marker_alone_completes_after_receipt_aged_out() {
        let f = fixture();
        add_agent(&f.registry, "bob", "Bob");
        store::write_marker(&f.world.state.receipt_seen_marker("bob", "E1")).unwrap();

        let mut env = envelope("E1", "name:bob");
        assert_eq!(dispatch_once(&f.world, &mut env), Decision::Complete);
    }

    #[test]
    fn stale_capability_blocks_without_inbox_write() {
        let f = fixture();
        add_agent(&f.registry, "ghost", "Ghost");
        // No heartbeat at all.

        let mut env = envelope("E4", "agent:ghost");
        let decision = dispatch_once(&f.world, &mut env);

        assert!(matches!(decision, Decision::Retry { ref reason, .. } if reason == "StaleCapability"));
        assert!(!f.world.state.inbox_new("ghost").join("E4.json").exists());
    }

    #[test]
    fn unknown_recipient_notifies_force_visible_immediately() {
        let f = fixture();

        let mut env = envelope("E4", "agent:ghost");
        let decision = dispatch_once(&f.world, &mut env);

        assert!(matches!(decision, Decision::Retry { ref reason, .. } if reason == "UnknownRecipient"));
        let events = f.notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, NotifyLevel::ForceVisible);

        // Second pass within the throttle window stays quiet.
        dispatch_once(&f.world, &mut env);
        assert_eq!(f.notifier.count(), 1);
    }

    #[test]
    fn awaiting_receipt_notifies_only_after_attempt_threshold() {
        let f = fixture();
        add_agent(&f.registry, "bob", "Bob");
        fresh_caps(&f.world, "bob");

        let mut env = envelope("E1", "name:bob");
        dispatch_once(&f.world, &mut env);
        assert_eq!(f.notifier.count(), 0);

        env.attempts = 2; // third attempt
        dispatch_once(&f.world, &mut env);
        assert_eq!(f.notifier.count(), 1);
        assert_eq!(f.notifier.events()[0].0, NotifyLevel::Warning);
    }

    #[test]
    fn inbox_write_is_idempotent_per_pair() {
        let f = fixture();
        add_agent(&f.registry, "bob", "Bob");
        fresh_caps(&f.world, "bob");

        let mut env = envelope("E1", "name:bob");
        dispatch_once(&f.world, &mut env);

        // The extension claimed the item into processing/.
        store::claim_move(
            &f.world.state.inbox_new("bob").join("E1.json"),
            &f.world.state.inbox_processing("bob").join("E1.json"),
        )
        .unwrap();

        // Another pass must not re-create the item in new/.
        dispatch_once(&f.world, &mut env);
        assert!(!f.world.state.inbox_new("bob").join("E1.json").exists());
        assert!(f.world.state.inbox_processing("bob").join("E1.json").exists());
    }

    #[test]
    fn fan_out_completes_only_when_all_receipts_present() {
        let f = fixture();
        for id in ["h1", "h2"] {
            f.registry.upsert(AgentInfo {
                agent_id: id.to_string(),
                name: id.to_string(),
                role: AgentRole::Hoplite,
                phalanx_id: Some("X".to_string()),
                parent_id: Some("p1".to_string()),
            });
            fresh_caps(&f.world, id);
        }
        f.registry.upsert(AgentInfo {
            agent_id: "p1".to_string(),
            name: "Polemarch".to_string(),
            role: AgentRole::Polemarch,
            phalanx_id: None,
            parent_id: None,
        });

        let mut env = envelope("E2", "phalanx");
        env.source_agent_id = "h1".to_string();
        // Sender h1 addresses its phalanx: only h2.
        let decision = dispatch_once(&f.world, &mut env);
        assert!(matches!(decision, Decision::Retry { .. }));
        assert!(f.world.state.inbox_new("h2").join("E2.json").exists());

        write_receipt(&f.world, "h2", "E2");
        let mut env = {
            let mut e = env.clone();
            e.attempts += 1;
            e
        };
        assert_eq!(dispatch_once(&f.world, &mut env), Decision::Complete);
    }

    #[test]
    fn poison_envelope_is_dropped_with_notification() {
        let f = fixture();
        let mut env = envelope("E6", "name:bob");
        env.message = "  ".to_string();

        assert_eq!(dispatch_once(&f.world, &mut env), Decision::Poison);
        assert_eq!(f.notifier.count(), 1);
        assert_eq!(f.notifier.events()[0].0, NotifyLevel::ForceVisible);
    }

    #[test]
    fn cached_resolution_survives_registry_changes_within_window() {
        let f = fixture();
        add_agent(&f.registry, "bob", "Bob");
        fresh_caps(&f.world, "bob");

        let mut env = envelope("E1", "name:bob");
        dispatch_once(&f.world, &mut env);
        assert!(env.recipients_resolved.is_some());

        // Bob disappears from the registry; the cached resolution still routes.
        f.registry.remove("bob");
        let decision = dispatch_once(&f.world, &mut env);
        assert!(matches!(decision, Decision::Retry { ref reason, .. } if reason == "AwaitingReceipt"));
    }

    #[test]
    fn stale_envelope_re_resolves_but_keeps_completed_recipients() {
        let f = fixture();
        add_agent(&f.registry, "bob", "Bob");
        fresh_caps(&f.world, "bob");

        let mut env = envelope("E1", "name:bob");
        dispatch_once(&f.world, &mut env);
        write_receipt(&f.world, "bob", "E1");

        // Past the re-resolve window, the name now maps to a different agent.
        env.created_at = epoch_now() - 120.0;
        f.registry.remove("bob");
        add_agent(&f.registry, "bob2", "Bob");
        fresh_caps(&f.world, "bob2");

        let decision = dispatch_once(&f.world, &mut env);
        // bob completed and stays counted; bob2 is newly pending.
        assert!(matches!(decision, Decision::Retry { ref reason, .. } if reason == "AwaitingReceipt"));
        let resolved = env.recipients_resolved.as_ref().unwrap();
        assert!(resolved.iter().any(|r| r.agent_id == "bob"));
        assert!(resolved.iter().any(|r| r.agent_id == "bob2"));

        write_receipt(&f.world, "bob2", "E1");
        let decision = dispatch_once(&f.world, &mut env);
        assert_eq!(decision, Decision::Complete);
    }
}
