//! Filesystem watcher for the queue roots.
//!
//! Watches `zeus-message-queue/new/` and the receipts tree; every relevant
//! change becomes a wake on the drain loop's channel. Purely a latency
//! optimization; the sweep timer alone is sufficient for correctness.

use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::mpsc::channel;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Watch `paths` and forward a unit wake per change batch.
pub fn spawn_queue_watcher(
    paths: Vec<PathBuf>,
    wake_tx: tokio::sync::mpsc::Sender<()>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    let (tx, rx) = channel();

    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })
        .context("Failed to create queue watcher")?;

    for path in &paths {
        watcher
            .watch(path, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
        info!("watching {}", path.display());
    }

    let handle = tokio::task::spawn_blocking(move || {
        let _watcher = watcher;
        loop {
            if cancel.is_cancelled() {
                debug!("queue watcher cancelled");
                break;
            }
            match rx.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(event) => {
                    // Temp files churn constantly; only completed records wake.
                    let relevant = event.paths.iter().any(|p| {
                        p.file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| !n.starts_with(".tmp-"))
                    });
                    if relevant {
                        // A full channel means a wake is already pending.
                        let _ = wake_tx.try_send(());
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    warn!("queue watcher disconnected");
                    break;
                }
            }
        }
    });

    Ok(handle)
}
