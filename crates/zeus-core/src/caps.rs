//! Capability registry: per-agent liveness published by extensions, queried
//! by the dispatcher to gate delivery.

use crate::schema::CapabilityHeartbeat;
use crate::state_dir::StateDir;
use crate::store::{self, StoreError};
use std::time::Duration;

/// Heartbeats older than this are stale and block delivery.
pub const MAX_HEARTBEAT_AGE: Duration = Duration::from_secs(30);

/// How often extensions re-emit their heartbeat.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Atomically publish a heartbeat. No tombstone is ever written on exit;
/// staleness is detected by age alone.
pub fn publish_heartbeat(state: &StateDir, heartbeat: &CapabilityHeartbeat) -> Result<(), StoreError> {
    store::ensure_dir(&state.caps_dir())?;
    store::write_json_atomic(&state.caps_path(&heartbeat.agent_id), heartbeat)
}

/// Whether `agent_id` is fresh for bus delivery at time `now`.
///
/// True iff the capability file exists, decodes, advertises `queue_bus`, and
/// `now - updated_at <= max_age`. Read errors of any kind are "not fresh";
/// this function never fails.
pub fn is_fresh(state: &StateDir, agent_id: &str, max_age: Duration, now: f64) -> bool {
    match read_heartbeat(state, agent_id) {
        Some(hb) => hb.supports.queue_bus && now - hb.updated_at <= max_age.as_secs_f64(),
        None => false,
    }
}

/// Read a heartbeat for diagnostics; `None` on missing or corrupt.
pub fn read_heartbeat(state: &StateDir, agent_id: &str) -> Option<CapabilityHeartbeat> {
    store::read_json(&state.caps_path(agent_id)).ok()
}
