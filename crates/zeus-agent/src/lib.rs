//! In-agent extension for the zeus message bus.
//!
//! One instance of [`extension::BusExtension`] runs inside each live agent
//! process. On every runtime lifecycle event it re-publishes the capability
//! heartbeat, keeps a filesystem watcher on its inbox, and schedules the
//! inbox pump. The pump claims items from `inbox/<self>/new/`, submits them
//! to the host runtime exactly once (gated by the processed ledger), and
//! emits accepted receipts for the dispatcher to observe.
//!
//! The watcher is a latency optimization only: `TurnEnd` events are the
//! guaranteed fallback trigger, so the extension makes progress on
//! filesystems where change notification is unavailable.

pub mod extension;
pub mod heartbeat;
pub mod pump;
pub mod runtime;
pub mod watcher;

pub use extension::{BusExtension, LifecycleEvent};
pub use pump::{InboxPump, PumpStats};
pub use runtime::{AgentRuntime, MockRuntime, SubmitError};
