//! Operator notifications.
//!
//! The dispatcher never drops an envelope without operator visibility. Every
//! blocked delivery surfaces through the [`Notifier`]; the production
//! implementation writes a tracing line plus a durable JSONL event so the
//! dashboard can show it after the fact.

use std::sync::Mutex;
use tracing::{error, info, warn};
use zeus_core::event_log::{EventFields, EventLogConfig, emit_event_best_effort};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Warning,
    /// Structural impossibility (unresolved recipient, poison payload);
    /// shown regardless of dashboard filter settings.
    ForceVisible,
}

impl NotifyLevel {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::ForceVisible => "force",
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotifyLevel, text: &str);
}

/// Production notifier: tracing + durable event log.
pub struct OperatorNotifier {
    event_log: EventLogConfig,
}

impl OperatorNotifier {
    pub fn new(event_log: EventLogConfig) -> Self {
        Self { event_log }
    }
}

impl Notifier for OperatorNotifier {
    fn notify(&self, level: NotifyLevel, text: &str) {
        match level {
            NotifyLevel::Info => info!("{text}"),
            NotifyLevel::Warning => warn!("{text}"),
            NotifyLevel::ForceVisible => error!("{text}"),
        }
        emit_event_best_effort(&self.event_log, EventFields {
            level: level.as_str(),
            source: "zeus-dispatch",
            action: "operator_notify",
            reason: Some(text.to_string()),
            ..Default::default()
        });
    }
}

/// Test double recording every notification.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(NotifyLevel, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(NotifyLevel, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, text)| text.contains(needle))
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NotifyLevel, text: &str) {
        self.events.lock().unwrap().push((level, text.to_string()));
    }
}
