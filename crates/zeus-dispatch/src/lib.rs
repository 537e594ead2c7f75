//! Dispatcher for the zeus message bus.
//!
//! One long-running process owns the envelope queue: it accepts enqueued
//! send requests, resolves targets to concrete agent ids, fans envelopes out
//! into per-recipient inbox items, and removes an envelope only once every
//! resolved recipient has produced a receipt. Delivery is gated on live
//! capability heartbeats; blocked envelopes retry with bounded exponential
//! backoff and surface an operator notification.
//!
//! All cross-process coordination is atomic rename: two dispatchers racing
//! over the same queue merely split the claims, they cannot corrupt state.

pub mod dispatch;
pub mod drain;
pub mod notify;
pub mod queue;
pub mod registry;
pub mod resolve;
pub mod retry;
pub mod watcher;
pub mod world;

pub use dispatch::{Decision, dispatch_once};
pub use notify::{Notifier, NotifyLevel, OperatorNotifier, RecordingNotifier};
pub use queue::{EnqueueRequest, enqueue};
pub use registry::{AgentInfo, AgentRegistry, InMemoryRegistry};
pub use resolve::{ResolveError, resolve_recipients};
pub use world::{Tunables, World};
