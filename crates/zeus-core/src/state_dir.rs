//! Canonical state directory resolution and on-disk layout.
//!
//! All persistent bus state lives under a single `STATE_DIR`, resolved from
//! the environment with the following precedence:
//!
//! 1. `ZEUS_STATE_DIR` (if set and non-empty), used as-is
//! 2. `ZEUS_HOME` (if set and non-empty), joined with `.zeus`
//! 3. Platform home directory, joined with `.zeus`
//! 4. `/tmp/zeus`
//!
//! Two roots matter underneath it:
//!
//! ```text
//! STATE_DIR/zeus-message-queue/   dispatcher-owned envelope queue
//!   new/<id>.json
//!   inflight/<id>.json
//!   receipts-seen/<agent-id>/<id>
//! STATE_DIR/zeus-agent-bus/       shared bus, dispatcher <-> extensions
//!   inbox/<agent-id>/new/<id>.json
//!   inbox/<agent-id>/processing/<id>.json
//!   receipts/<agent-id>/<id>.json
//!   caps/<agent-id>.json
//!   processed/<agent-id>.json
//! ```
//!
//! Integration tests override the location with `ZEUS_STATE_DIR` pointed at a
//! temp directory, the same way the rest of the env-first configuration works.

use crate::store::{self, StoreError};
use std::path::{Path, PathBuf};

const QUEUE_ROOT: &str = "zeus-message-queue";
const BUS_ROOT: &str = "zeus-agent-bus";

/// Resolved state directory plus path helpers for the full bus layout.
///
/// `StateDir` is cheap to clone and carries no open handles; it is resolved
/// once at process start and threaded through explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Resolve the state directory from the environment.
    pub fn resolve() -> Self {
        if let Some(dir) = non_empty_env("ZEUS_STATE_DIR") {
            return Self { root: PathBuf::from(dir) };
        }
        if let Some(home) = non_empty_env("ZEUS_HOME") {
            return Self { root: PathBuf::from(home).join(".zeus") };
        }
        if let Some(home) = dirs::home_dir() {
            return Self { root: home.join(".zeus") };
        }
        Self { root: PathBuf::from("/tmp/zeus") }
    }

    /// Use an explicit root, bypassing environment resolution.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create every directory of the layout. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` when the state directory is not writable;
    /// callers at process startup treat that as fatal.
    pub fn ensure_layout(&self) -> Result<(), StoreError> {
        store::ensure_dir(&self.queue_new())?;
        store::ensure_dir(&self.queue_inflight())?;
        store::ensure_dir(&self.receipts_seen_root())?;
        store::ensure_dir(&self.inbox_root())?;
        store::ensure_dir(&self.receipts_root())?;
        store::ensure_dir(&self.caps_dir())?;
        store::ensure_dir(&self.processed_dir())?;
        Ok(())
    }

    // Envelope queue (dispatcher-owned).

    pub fn queue_root(&self) -> PathBuf {
        self.root.join(QUEUE_ROOT)
    }

    pub fn queue_new(&self) -> PathBuf {
        self.queue_root().join("new")
    }

    pub fn queue_inflight(&self) -> PathBuf {
        self.queue_root().join("inflight")
    }

    pub fn receipts_seen_root(&self) -> PathBuf {
        self.queue_root().join("receipts-seen")
    }

    pub fn receipts_seen_dir(&self, agent_id: &str) -> PathBuf {
        self.receipts_seen_root().join(agent_id)
    }

    /// Empty marker recording that the dispatcher observed a receipt.
    pub fn receipt_seen_marker(&self, agent_id: &str, message_id: &str) -> PathBuf {
        self.receipts_seen_dir(agent_id).join(message_id)
    }

    // Agent bus (shared between dispatcher and extensions).

    pub fn bus_root(&self) -> PathBuf {
        self.root.join(BUS_ROOT)
    }

    pub fn inbox_root(&self) -> PathBuf {
        self.bus_root().join("inbox")
    }

    pub fn inbox_dir(&self, agent_id: &str) -> PathBuf {
        self.inbox_root().join(agent_id)
    }

    pub fn inbox_new(&self, agent_id: &str) -> PathBuf {
        self.inbox_dir(agent_id).join("new")
    }

    pub fn inbox_processing(&self, agent_id: &str) -> PathBuf {
        self.inbox_dir(agent_id).join("processing")
    }

    pub fn receipts_root(&self) -> PathBuf {
        self.bus_root().join("receipts")
    }

    pub fn receipts_dir(&self, agent_id: &str) -> PathBuf {
        self.receipts_root().join(agent_id)
    }

    pub fn receipt_path(&self, agent_id: &str, message_id: &str) -> PathBuf {
        self.receipts_dir(agent_id).join(format!("{message_id}.json"))
    }

    pub fn caps_dir(&self) -> PathBuf {
        self.bus_root().join("caps")
    }

    pub fn caps_path(&self, agent_id: &str) -> PathBuf {
        self.caps_dir().join(format!("{agent_id}.json"))
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.bus_root().join("processed")
    }

    pub fn processed_path(&self, agent_id: &str) -> PathBuf {
        self.processed_dir().join(format!("{agent_id}.json"))
    }

    pub fn event_log_path(&self) -> PathBuf {
        self.root.join("events.jsonl")
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    let value = std::env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
