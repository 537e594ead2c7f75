//! Processed-id ledger: the per-agent durable set guaranteeing at-most-once
//! submit across restarts.
//!
//! One file per agent (`zeus-agent-bus/processed/<agent-id>.json`), one
//! writer: that agent's own extension. The whole file is rewritten atomically
//! on each accept, which stays cheap at the bounded sizes the trim policy
//! allows; an append-only log with compaction can replace the representation
//! later without changing the contract.
//!
//! Ids only ever leave the set through pruning: keep the newest
//! [`LEDGER_MAX_IDS`], drop ids older than [`LEDGER_MAX_AGE`], whichever
//! trims first. ULID ids make lexical order equal to age order, so both
//! bounds are cheap.

use crate::clock::epoch_now;
use crate::state_dir::StateDir;
use crate::store::{self, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::warn;
use ulid::Ulid;

pub const LEDGER_MAX_IDS: usize = 10_000;
pub const LEDGER_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    updated_at: f64,
    ids: Vec<String>,
}

/// In-memory view of one agent's processed ledger.
///
/// Loaded lazily once per process lifetime; after that, membership checks are
/// in-memory and only accepts touch disk.
#[derive(Debug)]
pub struct ProcessedSet {
    agent_id: String,
    ids: BTreeSet<String>,
}

impl ProcessedSet {
    /// Load the ledger for `agent_id`. A missing file is an empty set. A
    /// corrupt file is treated as empty and overwritten on the next persist;
    /// the file is only ever written atomically, so corruption means external
    /// interference, and re-submitting is the at-least-once side of the
    /// contract (receipts stay idempotent).
    pub fn load(state: &StateDir, agent_id: &str) -> Self {
        let path = state.processed_path(agent_id);
        let ids = match store::read_json::<LedgerFile>(&path) {
            Ok(file) => file.ids.into_iter().collect(),
            Err(e) if e.is_not_found() => BTreeSet::new(),
            Err(e) => {
                warn!("processed ledger for {agent_id} unreadable, starting empty: {e}");
                BTreeSet::new()
            }
        };
        Self { agent_id: agent_id.to_string(), ids }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Add an id to the in-memory set. Returns false if already present.
    pub fn insert(&mut self, id: &str) -> bool {
        self.ids.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Trim to policy and atomically rewrite the ledger file.
    pub fn persist(&mut self, state: &StateDir) -> Result<(), StoreError> {
        self.trim(epoch_now());
        store::ensure_dir(&state.processed_dir())?;
        let file = LedgerFile {
            updated_at: epoch_now(),
            ids: self.ids.iter().cloned().collect(),
        };
        store::write_json_atomic(&state.processed_path(&self.agent_id), &file)
    }

    fn trim(&mut self, now: f64) {
        let cutoff_ms = ((now - LEDGER_MAX_AGE.as_secs_f64()) * 1000.0).max(0.0) as u64;
        self.ids.retain(|id| {
            // Non-ULID ids carry no age; only the count bound applies to them.
            match Ulid::from_string(&id.to_ascii_uppercase()) {
                Ok(ulid) => ulid.timestamp_ms() >= cutoff_ms,
                Err(_) => true,
            }
        });

        while self.ids.len() > LEDGER_MAX_IDS {
            self.ids.pop_first();
        }
    }
}
