//! Host runtime boundary.
//!
//! The agent runtime (the process hosting the model conversation) provides
//! message injection and session accessors. The extension only ever talks to
//! it through this trait, so tests substitute [`MockRuntime`].

use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use zeus_core::DeliverAs;

/// Submission to the host runtime failed; the pump treats any error as retry.
#[derive(Debug, Error)]
#[error("submit to agent runtime failed: {0}")]
pub struct SubmitError(pub String);

/// The in-process agent runtime the extension injects messages into.
pub trait AgentRuntime: Send + Sync {
    /// Hand `text` to the model conversation. `deliver_as` chooses between
    /// interrupting the current turn and queueing after it.
    fn send_user_message(&self, text: &str, deliver_as: DeliverAs) -> Result<(), SubmitError>;

    fn session_id(&self) -> String;
    fn session_file(&self) -> PathBuf;
    fn cwd(&self) -> PathBuf;
}

/// Scriptable runtime double: records every submit and can be told to fail
/// the next N calls.
#[derive(Debug, Default)]
pub struct MockRuntime {
    submitted: Mutex<Vec<(String, DeliverAs)>>,
    fail_next: Mutex<u32>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` submits fail.
    pub fn fail_next(&self, count: u32) {
        *self.fail_next.lock().unwrap() = count;
    }

    pub fn submitted(&self) -> Vec<(String, DeliverAs)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn submit_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

impl AgentRuntime for MockRuntime {
    fn send_user_message(&self, text: &str, deliver_as: DeliverAs) -> Result<(), SubmitError> {
        let mut fail = self.fail_next.lock().unwrap();
        if *fail > 0 {
            *fail -= 1;
            return Err(SubmitError("scripted failure".to_string()));
        }
        self.submitted.lock().unwrap().push((text.to_string(), deliver_as));
        Ok(())
    }

    fn session_id(&self) -> String {
        "mock-session".to_string()
    }

    fn session_file(&self) -> PathBuf {
        PathBuf::from("/tmp/mock-session.json")
    }

    fn cwd(&self) -> PathBuf {
        PathBuf::from("/tmp")
    }
}
