//! Process diagnostics setup for zeus binaries.
//!
//! Every zeus process emits on two channels: a human tracing stream on
//! stderr, leveled by `ZEUS_LOG`, and the durable JSONL operator event log
//! under the state directory (see [`crate::event_log`]). Binaries call
//! [`init`] once with their resolved [`StateDir`] and get both wired
//! consistently; the returned [`EventLogConfig`] is the sink they thread into
//! whatever emits events (notifier, pump, CLI).

use crate::event_log::EventLogConfig;
use crate::state_dir::StateDir;
use std::sync::OnceLock;
use tracing::Level;

static INSTALLED: OnceLock<Level> = OnceLock::new();

/// Wire up process diagnostics: tracing subscriber at the `ZEUS_LOG` level
/// plus the resolved event-log sink.
///
/// Safe to call multiple times; the subscriber is installed once and later
/// calls only re-resolve the sink. Never returns an error.
pub fn init(state: &StateDir) -> EventLogConfig {
    init_with_level(state, level_from_env())
}

/// Same, with an explicit level (used by `--verbose` flags, which win over
/// `ZEUS_LOG`).
pub fn init_with_level(state: &StateDir, level: Level) -> EventLogConfig {
    INSTALLED.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .try_init();
        level
    });
    EventLogConfig::from_env(state)
}

fn level_from_env() -> Level {
    std::env::var("ZEUS_LOG")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(Level::INFO)
}
