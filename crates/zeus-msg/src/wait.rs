//! Blocking wait for envelope delivery.
//!
//! An envelope is delivered once its file is gone from both `new/` and
//! `inflight/`. Uses OS-level file watching on the queue root with a polling
//! fallback for filesystems without change notification.

use anyhow::Result;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::time::{Duration, Instant};
use zeus_core::state_dir::StateDir;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, PartialEq, Eq)]
pub enum WaitResult {
    Delivered,
    Timeout,
}

/// Wait until the envelope is removed from the queue or `timeout` expires.
pub fn wait_for_removal(
    state: &StateDir,
    envelope_id: &str,
    timeout: Duration,
) -> Result<WaitResult> {
    let file = format!("{envelope_id}.json");
    let new_path = state.queue_new().join(&file);
    let inflight_path = state.queue_inflight().join(&file);

    if removed(&new_path, &inflight_path) {
        return Ok(WaitResult::Delivered);
    }

    match watch_wait(state, &new_path, &inflight_path, timeout) {
        Ok(result) => Ok(result),
        Err(e) => {
            eprintln!("Warning: file watching failed ({e}), falling back to polling");
            Ok(poll_wait(&new_path, &inflight_path, timeout))
        }
    }
}

fn removed(new_path: &Path, inflight_path: &Path) -> bool {
    !new_path.exists() && !inflight_path.exists()
}

fn watch_wait(
    state: &StateDir,
    new_path: &Path,
    inflight_path: &Path,
    timeout: Duration,
) -> Result<WaitResult> {
    let (tx, rx) = channel();

    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if res.is_ok() {
                let _ = tx.send(());
            }
        })?;
    watcher.watch(&state.queue_root(), RecursiveMode::Recursive)?;

    let start = Instant::now();
    loop {
        if removed(new_path, inflight_path) {
            return Ok(WaitResult::Delivered);
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Ok(WaitResult::Timeout);
        }

        // Re-check on events, but never trust them alone: cap the wait so a
        // missed rename still gets noticed.
        let remaining = (timeout - elapsed).min(POLL_INTERVAL);
        match rx.recv_timeout(remaining) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                anyhow::bail!("file watcher disconnected unexpectedly");
            }
        }
    }
}

fn poll_wait(new_path: &Path, inflight_path: &Path, timeout: Duration) -> WaitResult {
    let start = Instant::now();
    loop {
        if removed(new_path, inflight_path) {
            return WaitResult::Delivered;
        }
        if start.elapsed() >= timeout {
            return WaitResult::Timeout;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
