//! The drain loop: the dispatcher's single long-running task.
//!
//! States are Idle and Sweep. Wake sources: queue/receipt filesystem events
//! and the sweep timer; wakes within the debounce window coalesce into one
//! sweep, and exactly one sweep (hence one `dispatch_once`) is in flight at a
//! time. Transient I/O never escapes a sweep: state is left as-is for the
//! next pass.

use crate::dispatch::{Decision, dispatch_once};
use crate::queue;
use crate::watcher::spawn_queue_watcher;
use crate::world::World;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeus_core::clock::epoch_now;
use zeus_core::schema::Envelope;
use zeus_core::store::{self, StoreError};

/// Counters from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub reclaimed: usize,
    pub claimed: usize,
    pub completed: usize,
    pub retried: usize,
    pub poisoned: usize,
}

/// One full sweep: reclaim stale inflight, then claim and dispatch every due
/// envelope in filename order.
pub fn sweep(world: &World) -> SweepStats {
    let mut stats = SweepStats {
        reclaimed: queue::reclaim_inflight(&world.state, Some(world.tunables.inflight_lease)),
        ..Default::default()
    };

    let new_dir = world.state.queue_new();
    let inflight_dir = world.state.queue_inflight();
    let names = match store::list_sorted(&new_dir, ".json") {
        Ok(names) => names,
        Err(e) => {
            warn!("queue listing failed: {e}");
            return stats;
        }
    };

    let now = epoch_now();
    for name in names {
        let new_path = new_dir.join(&name);

        // Peek the schedule before claiming; corrupt files are claimed so the
        // poison path can dispose of them.
        let due = match store::read_json::<Envelope>(&new_path) {
            Ok(envelope) => envelope.next_attempt_at <= now,
            Err(StoreError::NotFound { .. }) => continue,
            Err(e) if e.is_corrupt() => true,
            Err(e) => {
                warn!("envelope {name} unreadable, leaving for next sweep: {e}");
                continue;
            }
        };
        if !due {
            continue;
        }

        let inflight_path = inflight_dir.join(&name);
        match store::claim_move(&new_path, &inflight_path) {
            Ok(true) => {}
            Ok(false) => continue, // another dispatcher won
            Err(e) => {
                warn!("claim of {name} failed: {e}");
                continue;
            }
        }
        stats.claimed += 1;

        let mut envelope = match store::read_json::<Envelope>(&inflight_path) {
            Ok(envelope) => envelope,
            Err(e) if e.is_corrupt() => {
                let id = name.trim_end_matches(".json");
                world.notify_throttled(
                    id,
                    "Poison",
                    crate::notify::NotifyLevel::ForceVisible,
                    &format!("dropping unparseable envelope {name}"),
                );
                let _ = store::unlink(&inflight_path);
                world.forget_envelope(id);
                stats.poisoned += 1;
                continue;
            }
            Err(e) => {
                // Leave in inflight; lease reclaim recovers it.
                warn!("claimed envelope {name} unreadable: {e}");
                continue;
            }
        };

        match dispatch_once(world, &mut envelope) {
            Decision::Complete => {
                if let Err(e) = store::unlink(&inflight_path) {
                    warn!("removing completed envelope {name} failed: {e}");
                } else {
                    world.forget_envelope(&envelope.id);
                    stats.completed += 1;
                }
            }
            Decision::Retry { delay, reason } => {
                debug!("envelope {} retrying in {delay:?} ({reason})", envelope.id);
                if let Err(e) = queue::requeue_with_backoff(&world.state, &mut envelope, delay) {
                    // Still in inflight; lease reclaim recovers it.
                    warn!("requeue of {name} failed: {e}");
                } else {
                    stats.retried += 1;
                }
            }
            Decision::Poison => {
                let _ = store::unlink(&inflight_path);
                world.forget_envelope(&envelope.id);
                stats.poisoned += 1;
            }
        }
    }

    if stats.claimed > 0 || stats.reclaimed > 0 {
        debug!(?stats, "sweep complete");
    }
    stats
}

/// Startup recovery: reclaim all inflight regardless of lease age, then run
/// one normal sweep.
pub fn startup_recovery(world: &World) -> SweepStats {
    let reclaimed = queue::reclaim_inflight(&world.state, None);
    if reclaimed > 0 {
        info!("startup recovery reclaimed {reclaimed} inflight envelope(s)");
    }
    let mut stats = sweep(world);
    stats.reclaimed += reclaimed;
    stats
}

/// Run the drain loop until cancelled.
///
/// The watcher is attached best-effort; on filesystems without change
/// notification the sweep timer alone drives progress. Shutdown is
/// cooperative: the current sweep finishes, then the loop exits. An
/// envelope mid-dispatch either completes or stays in `inflight/` for the
/// next startup recovery.
pub async fn run(world: Arc<World>, cancel: CancellationToken) -> Result<()> {
    world.state.ensure_layout().map_err(|e| {
        anyhow::anyhow!("state dir {} not writable: {e}", world.state.root().display())
    })?;
    let _ = store::remove_stale_temps(&world.state.queue_new(), Duration::from_secs(3600));
    let _ = store::remove_stale_temps(&world.state.queue_inflight(), Duration::from_secs(3600));

    info!("drain loop starting at {}", world.state.root().display());
    run_sweep_blocking(&world, true).await;

    let (wake_tx, mut wake_rx) = tokio::sync::mpsc::channel::<()>(16);
    let watcher = spawn_queue_watcher(
        vec![world.state.queue_new(), world.state.receipts_root()],
        wake_tx,
        cancel.clone(),
    );
    if let Err(e) = &watcher {
        warn!("queue watcher unavailable, sweep timer only: {e}");
    }

    let mut ticker = tokio::time::interval(world.tunables.sweep_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.reset(); // startup recovery just swept

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("drain loop cancelled");
                break;
            }
            _ = ticker.tick() => {
                run_sweep_blocking(&world, false).await;
            }
            Some(()) = wake_rx.recv() => {
                // Coalesce the burst before sweeping once.
                tokio::time::sleep(world.tunables.wake_debounce).await;
                while wake_rx.try_recv().is_ok() {}
                run_sweep_blocking(&world, false).await;
            }
        }
    }

    if let Ok(handle) = watcher {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    info!("drain loop stopped");
    Ok(())
}

async fn run_sweep_blocking(world: &Arc<World>, startup: bool) {
    let world = Arc::clone(world);
    let result = tokio::task::spawn_blocking(move || {
        if startup {
            startup_recovery(&world)
        } else {
            sweep(&world)
        }
    })
    .await;
    if let Err(e) = result {
        warn!("sweep task panicked: {e}");
    }
}
