//! Zeus dispatcher - drains the durable envelope queue

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zeus_core::state_dir::StateDir;
use zeus_dispatch::notify::OperatorNotifier;
use zeus_dispatch::registry::InMemoryRegistry;
use zeus_dispatch::world::{Tunables, World};
use zeus_dispatch::{drain, registry::AgentRegistry};

/// Zeus dispatcher - drains the durable envelope queue
#[derive(Parser, Debug)]
#[command(name = "zeus-dispatch")]
#[command(about = "Dispatcher for the zeus inter-agent message bus")]
#[command(version)]
struct Args {
    /// State directory (default: resolved from ZEUS_STATE_DIR / ZEUS_HOME)
    #[arg(long, value_name = "PATH")]
    state_dir: Option<PathBuf>,

    /// Agent roster snapshot (default: <state-dir>/roster.json when present)
    #[arg(long, value_name = "PATH")]
    roster: Option<PathBuf>,

    /// Sweep interval in seconds
    #[arg(long, value_name = "SECS", default_value_t = 2)]
    sweep_interval: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let state = match &args.state_dir {
        Some(dir) => StateDir::at(dir.clone()),
        None => StateDir::resolve(),
    };
    let event_log = if args.verbose {
        zeus_core::logging::init_with_level(&state, tracing::Level::DEBUG)
    } else {
        zeus_core::logging::init(&state)
    };
    info!("zeus-dispatch starting, state dir {}", state.root().display());

    // Fail fast on an unwritable state dir; everything else is retryable.
    state
        .ensure_layout()
        .with_context(|| format!("State directory {} is not writable", state.root().display()))?;

    let registry: Arc<dyn AgentRegistry> = {
        let roster_path = args
            .roster
            .clone()
            .unwrap_or_else(|| state.root().join("roster.json"));
        if roster_path.exists() {
            info!("loading roster from {}", roster_path.display());
            Arc::new(
                InMemoryRegistry::load_roster(&roster_path)
                    .context("Failed to load agent roster")?,
            )
        } else {
            warn!("no roster at {}; only receipts can complete envelopes", roster_path.display());
            Arc::new(InMemoryRegistry::new())
        }
    };

    let notifier = Arc::new(OperatorNotifier::new(event_log));
    let tunables = Tunables {
        sweep_interval: Duration::from_secs(args.sweep_interval.max(1)),
        ..Default::default()
    };
    let world = Arc::new(World::new(state, tunables, registry, notifier));

    let cancel = CancellationToken::new();
    let cancel_for_signals = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to create SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.expect("Failed to listen for Ctrl+C");
            info!("Received Ctrl+C");
        }

        cancel_for_signals.cancel();
    });

    drain::run(world, cancel).await.context("Drain loop failed")?;

    info!("zeus-dispatch shutdown complete");
    Ok(())
}
