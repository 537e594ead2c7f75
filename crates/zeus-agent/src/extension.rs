//! Lifecycle event glue: the extension entry point inside an agent process.

use crate::heartbeat;
use crate::pump::InboxPump;
use crate::runtime::AgentRuntime;
use crate::watcher::spawn_inbox_watcher;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeus_core::agent_id::canonical_non_empty;
use zeus_core::schema::AgentRole;
use zeus_core::state_dir::StateDir;
use zeus_core::store;

/// Runtime lifecycle events the host forwards to the extension.
///
/// Any of them triggers heartbeat + watcher check + pump; `TurnEnd` is the
/// guaranteed periodic fallback when no watcher could be installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    SessionStart,
    SessionSwitch,
    SessionFork,
    SessionTree,
    TurnEnd,
}

/// One bus extension per live agent process.
pub struct BusExtension {
    state: StateDir,
    agent_id: String,
    role: AgentRole,
    runtime: Arc<dyn AgentRuntime>,
    pump: Arc<InboxPump>,
    watcher_installed: Mutex<bool>,
    cancel: CancellationToken,
}

impl BusExtension {
    /// Construct from the environment.
    ///
    /// Returns `None` when `ZEUS_AGENT_ID` is unset or canonicalizes to
    /// empty: such an agent has no deterministic identity and does not
    /// participate in the bus.
    pub fn from_env(state: StateDir, runtime: Arc<dyn AgentRuntime>) -> Option<Self> {
        let raw_id = std::env::var("ZEUS_AGENT_ID").unwrap_or_default();
        let agent_id = canonical_non_empty(&raw_id)?;
        let role = std::env::var("ZEUS_ROLE")
            .ok()
            .and_then(|r| r.parse().ok())
            .unwrap_or_default();
        Some(Self::new(state, agent_id, role, runtime))
    }

    pub fn new(
        state: StateDir,
        agent_id: impl Into<String>,
        role: AgentRole,
        runtime: Arc<dyn AgentRuntime>,
    ) -> Self {
        let agent_id = agent_id.into();
        let pump = Arc::new(InboxPump::new(state.clone(), agent_id.clone(), Arc::clone(&runtime)));
        Self {
            state,
            agent_id,
            role,
            runtime,
            pump,
            watcher_installed: Mutex::new(false),
            cancel: CancellationToken::new(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn pump(&self) -> &Arc<InboxPump> {
        &self.pump
    }

    /// Handle one runtime lifecycle event.
    pub fn on_event(&self, event: LifecycleEvent) {
        debug!(agent = %self.agent_id, ?event, "lifecycle event");

        heartbeat::publish_best_effort(&self.state, &self.agent_id, self.role, self.runtime.as_ref());
        self.ensure_watcher();
        self.pump.schedule();
    }

    /// Start the heartbeat interval task. Call once after construction.
    pub fn start(&self) {
        heartbeat::spawn_heartbeat_task(
            self.state.clone(),
            self.agent_id.clone(),
            self.role,
            Arc::clone(&self.runtime),
            self.cancel.clone(),
        );
        info!("bus extension started for {}", self.agent_id);
    }

    /// Cooperative shutdown of background tasks.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn ensure_watcher(&self) {
        let mut installed = self.watcher_installed.lock().unwrap();
        if *installed {
            return;
        }

        let inbox_dir = self.state.inbox_dir(&self.agent_id);
        if let Err(e) = store::ensure_dir(&self.state.inbox_new(&self.agent_id))
            .and_then(|()| store::ensure_dir(&self.state.inbox_processing(&self.agent_id)))
        {
            warn!("inbox directories for {} not creatable yet: {e}", self.agent_id);
            return;
        }

        match spawn_inbox_watcher(inbox_dir, Arc::clone(&self.pump), self.cancel.clone()) {
            Ok(_handle) => *installed = true,
            Err(e) => {
                // Turn-end events keep the pump progressing without it.
                warn!("inbox watcher unavailable for {}: {e}", self.agent_id);
            }
        }
    }
}

impl Drop for BusExtension {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use serial_test::serial;
    use tempfile::TempDir;
    use zeus_core::caps;
    use zeus_core::clock::epoch_now;

    #[tokio::test]
    async fn on_event_publishes_heartbeat_and_pumps() {
        let tmp = TempDir::new().unwrap();
        let state = StateDir::at(tmp.path());
        state.ensure_layout().unwrap();
        let runtime = Arc::new(MockRuntime::new());

        let ext = BusExtension::new(
            state.clone(),
            "bob",
            AgentRole::Hoplite,
            runtime.clone() as Arc<dyn AgentRuntime>,
        );
        ext.on_event(LifecycleEvent::SessionStart);

        assert!(caps::is_fresh(&state, "bob", caps::MAX_HEARTBEAT_AGE, epoch_now()));
        ext.shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn from_env_requires_agent_id() {
        let tmp = TempDir::new().unwrap();
        let state = StateDir::at(tmp.path());
        let runtime: Arc<dyn AgentRuntime> = Arc::new(MockRuntime::new());

        unsafe { std::env::remove_var("ZEUS_AGENT_ID") };
        assert!(BusExtension::from_env(state.clone(), Arc::clone(&runtime)).is_none());

        unsafe { std::env::set_var("ZEUS_AGENT_ID", "!!!") };
        assert!(BusExtension::from_env(state.clone(), Arc::clone(&runtime)).is_none());

        unsafe {
            std::env::set_var("ZEUS_AGENT_ID", "h-7");
            std::env::set_var("ZEUS_ROLE", "hoplite");
        }
        let ext = BusExtension::from_env(state, runtime).unwrap();
        assert_eq!(ext.agent_id(), "h-7");

        unsafe {
            std::env::remove_var("ZEUS_AGENT_ID");
            std::env::remove_var("ZEUS_ROLE");
        }
    }
}
