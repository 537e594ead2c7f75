//! Shared structured JSONL event logging for zeus binaries.
//!
//! A compact, cross-process operator-event sink used by `zeus-dispatch`,
//! `zeus-msg`, and the in-agent extension. Events append to
//! `STATE_DIR/events.jsonl` with size-based rotation; the dashboard (out of
//! scope here) tails this file. Emission is always best-effort: an event that
//! cannot be written is dropped, never an error in the caller.
//!
//! Message payloads are private by default. They reach the durable trail
//! only when the operator opts in via `ZEUS_LOG_MSG` (`truncated` or `full`);
//! `ZEUS_LOG_TRUNC_CHARS` bounds the truncated form.

use crate::clock::epoch_now;
use crate::state_dir::StateDir;
use serde_json::{Map, Value, json};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

const DEFAULT_MAX_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_MAX_FILES: u32 = 5;
const DEFAULT_TRUNC_CHARS: usize = 200;

/// How much of a message payload the durable trail may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageVerbosity {
    None,
    Truncated,
    Full,
}

impl MessageVerbosity {
    fn from_env() -> Self {
        match std::env::var("ZEUS_LOG_MSG")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "full" => Self::Full,
            "truncated" => Self::Truncated,
            _ => Self::None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EventLogConfig {
    pub path: PathBuf,
    pub max_bytes: u64,
    pub max_files: u32,
    pub message_verbosity: MessageVerbosity,
    pub truncate_chars: usize,
}

impl EventLogConfig {
    pub fn from_env(state: &StateDir) -> Self {
        let path = std::env::var("ZEUS_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| state.event_log_path());
        let max_bytes = std::env::var("ZEUS_LOG_MAX_BYTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_BYTES);
        let max_files = std::env::var("ZEUS_LOG_MAX_FILES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_FILES);
        let truncate_chars = std::env::var("ZEUS_LOG_TRUNC_CHARS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_TRUNC_CHARS);

        Self {
            path,
            max_bytes,
            max_files,
            message_verbosity: MessageVerbosity::from_env(),
            truncate_chars,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EventFields {
    pub level: &'static str,
    pub source: &'static str,
    pub action: &'static str,
    pub agent_id: Option<String>,
    pub target: Option<String>,
    pub message_id: Option<String>,
    pub reason: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub attempts: Option<u32>,
    /// Payload text; written only per [`EventLogConfig::message_verbosity`].
    pub message_text: Option<String>,
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn maybe_message_field(cfg: &EventLogConfig, text: Option<&str>) -> Option<String> {
    let txt = text?;
    match cfg.message_verbosity {
        MessageVerbosity::None => None,
        MessageVerbosity::Truncated => Some(truncate_chars(txt, cfg.truncate_chars)),
        MessageVerbosity::Full => Some(txt.to_string()),
    }
}

fn build_line(cfg: &EventLogConfig, fields: &EventFields) -> Value {
    let mut map = Map::new();
    map.insert("ts".to_string(), json!(epoch_now()));
    map.insert("level".to_string(), json!(fields.level));
    map.insert("source".to_string(), json!(fields.source));
    map.insert("action".to_string(), json!(fields.action));

    let optional = [
        ("agent_id", &fields.agent_id),
        ("target", &fields.target),
        ("message_id", &fields.message_id),
        ("reason", &fields.reason),
        ("result", &fields.result),
        ("error", &fields.error),
    ];
    for (key, value) in optional {
        if let Some(v) = value {
            map.insert(key.to_string(), json!(v));
        }
    }
    if let Some(attempts) = fields.attempts {
        map.insert("attempts".to_string(), json!(attempts));
    }
    if let Some(message) = maybe_message_field(cfg, fields.message_text.as_deref()) {
        map.insert("message".to_string(), json!(message));
    }

    Value::Object(map)
}

fn rotate_if_needed(cfg: &EventLogConfig) {
    let Ok(meta) = fs::metadata(&cfg.path) else { return };
    if meta.len() < cfg.max_bytes {
        return;
    }

    // events.jsonl.N-1 -> events.jsonl.N, ..., events.jsonl -> events.jsonl.1
    for i in (1..cfg.max_files).rev() {
        let from = rotated_name(cfg, i);
        let to = rotated_name(cfg, i + 1);
        let _ = fs::rename(&from, &to);
    }
    let _ = fs::rename(&cfg.path, rotated_name(cfg, 1));
}

fn rotated_name(cfg: &EventLogConfig, index: u32) -> PathBuf {
    let mut name = cfg.path.as_os_str().to_os_string();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

/// Append one event line. Never fails; failures are swallowed.
pub fn emit_event_best_effort(cfg: &EventLogConfig, fields: EventFields) {
    let line = build_line(cfg, &fields);

    let write = || -> std::io::Result<()> {
        if let Some(parent) = cfg.path.parent() {
            fs::create_dir_all(parent)?;
        }
        rotate_if_needed(cfg);
        let mut file = OpenOptions::new().create(true).append(true).open(&cfg.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    };

    if write().is_err() {
        // Drop the event; the tracing line is the fallback trail.
    }
}
