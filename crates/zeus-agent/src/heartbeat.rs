//! Capability heartbeat publishing from inside the agent process.

use crate::runtime::AgentRuntime;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zeus_core::caps::{self, HEARTBEAT_INTERVAL};
use zeus_core::clock::epoch_now;
use zeus_core::schema::{AgentRole, CapabilityHeartbeat, ExtensionInfo, Supports};
use zeus_core::state_dir::StateDir;

/// Build the heartbeat record for this process, stamped now.
pub fn build_heartbeat(
    agent_id: &str,
    role: AgentRole,
    runtime: &dyn AgentRuntime,
) -> CapabilityHeartbeat {
    CapabilityHeartbeat {
        agent_id: agent_id.to_string(),
        role,
        session_id: runtime.session_id(),
        session_path: runtime.session_file().to_string_lossy().to_string(),
        cwd: runtime.cwd().to_string_lossy().to_string(),
        updated_at: epoch_now(),
        supports: Supports { queue_bus: true, receipt_v1: true },
        extension: ExtensionInfo {
            name: "zeus-agent".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        unknown_fields: Default::default(),
    }
}

/// Publish once, best-effort. A failed publish only delays freshness until
/// the next lifecycle event or interval tick.
pub fn publish_best_effort(state: &StateDir, agent_id: &str, role: AgentRole, runtime: &dyn AgentRuntime) {
    let heartbeat = build_heartbeat(agent_id, role, runtime);
    if let Err(e) = caps::publish_heartbeat(state, &heartbeat) {
        warn!("heartbeat publish for {agent_id} failed: {e}");
    } else {
        debug!("heartbeat published for {agent_id}");
    }
}

/// Spawn the interval re-publisher. Runs until cancelled.
pub fn spawn_heartbeat_task(
    state: StateDir,
    agent_id: String,
    role: AgentRole,
    runtime: Arc<dyn AgentRuntime>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("heartbeat task cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    publish_best_effort(&state, &agent_id, role, runtime.as_ref());
                }
            }
        }
    })
}
