//! Filesystem watcher on the agent's own inbox.
//!
//! Best-effort low-latency trigger only: every event just schedules a pump.
//! When the watcher cannot be installed (non-notifying filesystems) the
//! caller falls back to lifecycle events alone, and the bus still makes
//! progress.

use crate::pump::InboxPump;
use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::channel;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Watch `inbox_dir` recursively and schedule the pump on every change.
///
/// Returns an error when the watcher cannot be created or attached; the
/// caller treats that as "no watcher" and relies on the event fallback.
pub fn spawn_inbox_watcher(
    inbox_dir: PathBuf,
    pump: Arc<InboxPump>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    let (tx, rx) = channel();

    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res
                && let Err(e) = tx.send(event)
            {
                warn!("inbox watcher channel closed: {e}");
            }
        })
        .context("Failed to create inbox watcher")?;

    watcher
        .watch(&inbox_dir, RecursiveMode::Recursive)
        .context("Failed to watch inbox directory")?;

    info!("watching inbox at {}", inbox_dir.display());

    let handle = tokio::task::spawn_blocking(move || {
        // Keep the watcher alive for the lifetime of the loop.
        let _watcher = watcher;
        loop {
            if cancel.is_cancelled() {
                debug!("inbox watcher cancelled");
                break;
            }
            match rx.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(_event) => pump.schedule(),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    warn!("inbox watcher disconnected");
                    break;
                }
            }
        }
    });

    Ok(handle)
}
