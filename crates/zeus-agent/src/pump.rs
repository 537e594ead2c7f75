//! Inbox pump: claim, submit, acknowledge.
//!
//! The pump is cooperative single-threaded within a process: at most one pass
//! runs at a time, and overlapping schedule requests coalesce into exactly
//! one re-run after the current pass. The flight state machine is
//! `Idle -> Running -> RunningWithPending` behind a single mutex.
//!
//! A pass first recovers stuck claims in `processing/` (crash recovery), then
//! drains `new/` via claim-move. Per item, the write ordering is the
//! crash-convergence invariant: **ledger before receipt before delete**. A
//! crash anywhere in between re-runs into the duplicate path, which re-emits
//! the receipt idempotently and deletes the file without a second submit.

use crate::runtime::AgentRuntime;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use zeus_core::clock;
use zeus_core::event_log::{EventFields, EventLogConfig, emit_event_best_effort};
use zeus_core::ledger::ProcessedSet;
use zeus_core::schema::{InboxItem, Receipt};
use zeus_core::state_dir::StateDir;
use zeus_core::store::{self, StoreError, claim_move};

/// Coalescing window for schedule requests.
pub const PUMP_DEBOUNCE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flight {
    Idle,
    Running,
    RunningWithPending,
}

/// Counters from one pump pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Items handed to the runtime this pass
    pub submitted: usize,
    /// Items already in the ledger (receipt re-emitted if missing)
    pub duplicates: usize,
    /// Malformed items deleted
    pub poisoned: usize,
    /// Items moved back to `new/` after a failed submit
    pub requeued: usize,
}

/// Per-agent inbox pump. One instance per agent process.
pub struct InboxPump {
    state: StateDir,
    agent_id: String,
    runtime: Arc<dyn AgentRuntime>,
    event_log: EventLogConfig,
    // Loaded lazily once per process lifetime.
    ledger: Mutex<Option<ProcessedSet>>,
    flight: Mutex<Flight>,
}

impl InboxPump {
    pub fn new(state: StateDir, agent_id: impl Into<String>, runtime: Arc<dyn AgentRuntime>) -> Self {
        let event_log = EventLogConfig::from_env(&state);
        Self {
            state,
            agent_id: agent_id.into(),
            runtime,
            event_log,
            ledger: Mutex::new(None),
            flight: Mutex::new(Flight::Idle),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Schedule a debounced pump pass on the tokio runtime.
    ///
    /// Requests arriving while a pass is in flight coalesce into one re-run.
    pub fn schedule(self: &Arc<Self>) {
        {
            let mut flight = self.flight.lock().unwrap();
            match *flight {
                Flight::Idle => *flight = Flight::Running,
                Flight::Running | Flight::RunningWithPending => {
                    *flight = Flight::RunningWithPending;
                    return;
                }
            }
        }

        let pump = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(PUMP_DEBOUNCE).await;
            loop {
                let worker = Arc::clone(&pump);
                let _ = tokio::task::spawn_blocking(move || worker.run_pass()).await;

                let mut flight = pump.flight.lock().unwrap();
                if *flight == Flight::RunningWithPending {
                    *flight = Flight::Running;
                } else {
                    *flight = Flight::Idle;
                    break;
                }
            }
        });
    }

    /// Run one synchronous pump pass.
    ///
    /// Transient I/O never escapes: unreadable directories leave state as-is
    /// for the next pass.
    pub fn run_pass(&self) -> PumpStats {
        let mut stats = PumpStats::default();
        let processing_dir = self.state.inbox_processing(&self.agent_id);
        let new_dir = self.state.inbox_new(&self.agent_id);

        // Recover stuck claims from a prior crash.
        match store::list_sorted(&processing_dir, ".json") {
            Ok(names) => {
                for name in names {
                    self.process_claimed(&name, &mut stats);
                }
            }
            Err(e) => warn!("inbox recover listing failed: {e}"),
        }

        // Drain new arrivals.
        match store::list_sorted(&new_dir, ".json") {
            Ok(names) => {
                for name in names {
                    match claim_move(&new_dir.join(&name), &processing_dir.join(&name)) {
                        Ok(true) => self.process_claimed(&name, &mut stats),
                        Ok(false) => {} // lost the race or vanished
                        Err(e) => warn!("inbox claim of {name} failed: {e}"),
                    }
                }
            }
            Err(e) => warn!("inbox drain listing failed: {e}"),
        }

        debug!(
            agent = %self.agent_id,
            submitted = stats.submitted,
            duplicates = stats.duplicates,
            poisoned = stats.poisoned,
            requeued = stats.requeued,
            "pump pass complete"
        );
        stats
    }

    /// Process one file sitting in `processing/`, keeping its original
    /// filename for the retry path.
    fn process_claimed(&self, name: &str, stats: &mut PumpStats) {
        let processing_path = self.state.inbox_processing(&self.agent_id).join(name);

        let item = match store::read_json::<InboxItem>(&processing_path) {
            Ok(item) => item,
            Err(StoreError::NotFound { .. }) => return,
            Err(e) if e.is_corrupt() => {
                // Poison: nothing valid to retry.
                warn!("poison inbox item {name}: {e}");
                self.emit_poison(name, &e.to_string());
                let _ = store::unlink(&processing_path);
                stats.poisoned += 1;
                return;
            }
            Err(e) => {
                warn!("inbox item {name} unreadable, leaving for next pass: {e}");
                return;
            }
        };

        if let Err(reason) = item.validate() {
            warn!("poison inbox item {name}: {reason}");
            self.emit_poison(name, &reason);
            let _ = store::unlink(&processing_path);
            stats.poisoned += 1;
            return;
        }

        let mut ledger = self.ledger.lock().unwrap();
        let ledger = ledger.get_or_insert_with(|| ProcessedSet::load(&self.state, &self.agent_id));

        if ledger.contains(&item.id) {
            // Duplicate path: converge to receipt + deleted claim, no submit.
            if let Err(e) = self.ensure_receipt(&item) {
                warn!("receipt re-emit for {} failed, leaving claim: {e}", item.id);
                return;
            }
            let _ = store::unlink(&processing_path);
            stats.duplicates += 1;
            return;
        }

        if let Err(e) = self.runtime.send_user_message(&item.message, item.deliver_as) {
            debug!("submit of {} failed, requeueing: {e}", item.id);
            let new_path = self.state.inbox_new(&self.agent_id).join(name);
            match claim_move(&processing_path, &new_path) {
                Ok(_) => stats.requeued += 1,
                Err(move_err) => warn!("requeue of {name} failed: {move_err}"),
            }
            return;
        }

        // Ledger write precedes receipt write precedes claim delete.
        ledger.insert(&item.id);
        if let Err(e) = ledger.persist(&self.state) {
            warn!("ledger persist for {} failed, leaving claim: {e}", item.id);
            return;
        }
        if let Err(e) = self.ensure_receipt(&item) {
            warn!("receipt write for {} failed, leaving claim: {e}", item.id);
            return;
        }
        let _ = store::unlink(&processing_path);
        stats.submitted += 1;

        emit_event_best_effort(&self.event_log, EventFields {
            level: "info",
            source: "zeus-agent",
            action: "inbox_accepted",
            agent_id: Some(self.agent_id.clone()),
            message_id: Some(item.id.clone()),
            result: Some("accepted".to_string()),
            message_text: Some(item.message.clone()),
            ..Default::default()
        });
    }

    fn emit_poison(&self, name: &str, reason: &str) {
        emit_event_best_effort(&self.event_log, EventFields {
            level: "warn",
            source: "zeus-agent",
            action: "inbox_poison",
            agent_id: Some(self.agent_id.clone()),
            message_id: Some(name.trim_end_matches(".json").to_string()),
            error: Some(reason.to_string()),
            ..Default::default()
        });
    }

    /// Write the accepted receipt if it is not already present. Idempotent.
    fn ensure_receipt(&self, item: &InboxItem) -> Result<(), StoreError> {
        let path = self.state.receipt_path(&self.agent_id, &item.id);
        if path.exists() {
            return Ok(());
        }
        store::ensure_dir(&self.state.receipts_dir(&self.agent_id))?;
        let receipt = Receipt::accepted(
            &item.id,
            &self.agent_id,
            self.runtime.session_id(),
            self.runtime.session_file().to_string_lossy().to_string(),
            clock::epoch_now(),
        );
        store::write_json_atomic(&path, &receipt)
    }
}
