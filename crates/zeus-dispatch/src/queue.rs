//! Durable envelope queue operations.
//!
//! An envelope lives in exactly one of `new/` or `inflight/`. Enqueue writes
//! to `new/`; the drain loop claims into `inflight/` for one dispatch pass
//! and either deletes (complete) or rewrites + moves back (retry). A crashed
//! dispatcher leaves envelopes in `inflight/`; lease-based reclaim returns
//! them to `new/`.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use zeus_core::clock::epoch_now;
use zeus_core::ids::next_message_id;
use zeus_core::schema::{AgentRole, DeliverAs, Envelope};
use zeus_core::state_dir::StateDir;
use zeus_core::store::{self, StoreError};

#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("message is empty after trimming")]
    EmptyMessage,

    #[error("target is empty")]
    EmptyTarget,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A send request from the CLI or the dashboard.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub source_agent_id: String,
    pub source_name: String,
    pub source_role: AgentRole,
    pub target: String,
    pub message: String,
    pub deliver_as: DeliverAs,
}

/// Build and durably persist a new envelope; returns its id.
///
/// Never blocks on recipients and never contacts them; a dispatcher started
/// later will drain whatever this wrote.
pub fn enqueue(state: &StateDir, request: EnqueueRequest) -> Result<String, EnqueueError> {
    if request.message.trim().is_empty() {
        return Err(EnqueueError::EmptyMessage);
    }
    if request.target.trim().is_empty() {
        return Err(EnqueueError::EmptyTarget);
    }

    let now = epoch_now();
    let envelope = Envelope {
        id: next_message_id(),
        source_agent_id: request.source_agent_id,
        source_name: request.source_name,
        source_role: request.source_role,
        target: request.target,
        message: request.message,
        deliver_as: request.deliver_as,
        created_at: now,
        updated_at: now,
        attempts: 0,
        next_attempt_at: now,
        recipients_resolved: None,
        unknown_fields: Default::default(),
    };

    store::ensure_dir(&state.queue_new())?;
    store::write_json_atomic(&state.queue_new().join(envelope.file_name()), &envelope)?;
    debug!("enqueued {} -> {}", envelope.id, envelope.target);
    Ok(envelope.id)
}

/// Rewrite the envelope's scheduling state in `inflight/` and move it back to
/// `new/` for a later attempt.
///
/// The rewrite lands before the move, so a crash in between leaves a
/// fresh-leased inflight file that reclaim returns to `new/` intact.
pub fn requeue_with_backoff(
    state: &StateDir,
    envelope: &mut Envelope,
    delay: Duration,
) -> Result<(), StoreError> {
    let now = epoch_now();
    envelope.attempts += 1;
    envelope.next_attempt_at = now + delay.as_secs_f64();
    envelope.updated_at = now;

    let inflight_path = state.queue_inflight().join(envelope.file_name());
    store::write_json_atomic(&inflight_path, envelope)?;
    store::claim_move(&inflight_path, &state.queue_new().join(envelope.file_name()))?;
    Ok(())
}

/// Persist a freshly cached recipient resolution while the envelope is held
/// in `inflight/`, so retries reuse it.
pub fn persist_resolution(state: &StateDir, envelope: &Envelope) -> Result<(), StoreError> {
    store::write_json_atomic(&state.queue_inflight().join(envelope.file_name()), envelope)
}

/// Return stale `inflight/` envelopes to `new/`.
///
/// With `lease = None`, reclaims everything regardless of age (startup
/// recovery after a dispatcher crash). Unreadable envelopes are reclaimed
/// too; the next dispatch pass decides whether they are poison.
pub fn reclaim_inflight(state: &StateDir, lease: Option<Duration>) -> usize {
    let inflight_dir = state.queue_inflight();
    let names = match store::list_sorted(&inflight_dir, ".json") {
        Ok(names) => names,
        Err(e) => {
            warn!("inflight listing failed: {e}");
            return 0;
        }
    };

    let now = epoch_now();
    let mut reclaimed = 0;
    for name in names {
        let src = inflight_dir.join(&name);

        if let Some(lease) = lease {
            let expired = match store::read_json::<Envelope>(&src) {
                Ok(envelope) => now - envelope.updated_at > lease.as_secs_f64(),
                Err(StoreError::NotFound { .. }) => continue,
                // Unreadable: let the sweep claim it and apply poison handling.
                Err(_) => true,
            };
            if !expired {
                continue;
            }
        }

        match store::claim_move(&src, &state.queue_new().join(&name)) {
            Ok(true) => {
                debug!("reclaimed inflight envelope {name}");
                reclaimed += 1;
            }
            Ok(false) => {}
            Err(e) => warn!("reclaim of {name} failed: {e}"),
        }
    }
    reclaimed
}
