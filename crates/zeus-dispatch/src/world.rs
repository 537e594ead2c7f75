//! The dispatcher's explicit world value.
//!
//! Process-wide collaborators (registry, notifier, tunables) are constructed
//! once at init and threaded into every operation. No ambient module-level
//! mutability.

use crate::notify::{Notifier, NotifyLevel};
use crate::registry::AgentRegistry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zeus_core::clock::epoch_now;
use zeus_core::state_dir::StateDir;

/// Timing and policy knobs.
#[derive(Debug, Clone)]
pub struct Tunables {
    pub max_heartbeat_age: Duration,
    pub sweep_interval: Duration,
    pub wake_debounce: Duration,
    pub inflight_lease: Duration,
    pub retry_base: Duration,
    pub retry_cap: Duration,
    /// Attempts before a non-structural blocking reason notifies
    pub attempts_notify: u32,
    pub notify_throttle: Duration,
    pub reresolve_after: Duration,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            max_heartbeat_age: zeus_core::caps::MAX_HEARTBEAT_AGE,
            sweep_interval: Duration::from_secs(2),
            wake_debounce: Duration::from_millis(50),
            inflight_lease: Duration::from_secs(120),
            retry_base: Duration::from_secs(2),
            retry_cap: Duration::from_secs(60),
            attempts_notify: 3,
            notify_throttle: Duration::from_secs(60),
            reresolve_after: Duration::from_secs(60),
        }
    }
}

/// Everything a dispatch pass needs, constructed once in `main`.
pub struct World {
    pub state: StateDir,
    pub tunables: Tunables,
    pub registry: Arc<dyn AgentRegistry>,
    pub notifier: Arc<dyn Notifier>,
    // (envelope id, reason kind) -> epoch seconds of last notification
    throttle: Mutex<HashMap<(String, String), f64>>,
}

impl World {
    pub fn new(
        state: StateDir,
        tunables: Tunables,
        registry: Arc<dyn AgentRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            state,
            tunables,
            registry,
            notifier,
            throttle: Mutex::new(HashMap::new()),
        }
    }

    /// Notify at most once per `(envelope, reason)` per throttle window.
    /// Returns whether the notification was emitted.
    pub fn notify_throttled(
        &self,
        envelope_id: &str,
        reason_kind: &str,
        level: NotifyLevel,
        text: &str,
    ) -> bool {
        let key = (envelope_id.to_string(), reason_kind.to_string());
        let now = epoch_now();
        let window = self.tunables.notify_throttle.as_secs_f64();

        let mut throttle = self.throttle.lock().unwrap();
        if let Some(last) = throttle.get(&key)
            && now - last < window
        {
            return false;
        }
        throttle.insert(key, now);
        drop(throttle);

        self.notifier.notify(level, text);
        true
    }

    /// Drop throttle state for a finished envelope.
    pub fn forget_envelope(&self, envelope_id: &str) {
        self.throttle.lock().unwrap().retain(|(id, _), _| id != envelope_id);
    }
}
