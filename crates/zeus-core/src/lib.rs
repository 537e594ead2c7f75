//! Core library for the zeus message bus.
//!
//! Zeus supervises a fleet of interactive coding agents that exchange textual
//! prompts through a durable, filesystem-backed bus. This crate holds the
//! pieces shared by the dispatcher, the in-agent extension, and the CLI:
//!
//! - **Atomic file store**: write-rename, claim-move, sorted listings. All
//!   filesystem mutation in the system goes through [`store`].
//! - **On-disk schema**: envelopes, inbox items, receipts, capability
//!   heartbeats, and the processed-id ledger.
//! - **Capability registry**: heartbeat publish and freshness queries used to
//!   gate delivery.
//! - **State directory** resolution and layout ([`state_dir::StateDir`]).
//!
//! Coordination between processes relies exclusively on atomic intra-directory
//! rename on a local filesystem. There are no lockfiles.

pub mod agent_id;
pub mod caps;
pub mod clock;
pub mod event_log;
pub mod ids;
pub mod ledger;
pub mod logging;
pub mod schema;
pub mod state_dir;
pub mod store;

pub use schema::{AgentRole, CapabilityHeartbeat, DeliverAs, Envelope, InboxItem, Receipt, ResolvedRecipient};
pub use state_dir::StateDir;
pub use store::StoreError;
