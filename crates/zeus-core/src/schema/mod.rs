//! On-disk record types for the bus.
//!
//! All records are UTF-8 JSON. Readers tolerate unknown fields (each struct
//! carries a flattened `unknown_fields` map) so older dispatchers and newer
//! extensions can share a state directory; missing required fields are
//! treated as poison at the call sites that read them.

mod envelope;
mod heartbeat;
mod inbox_item;
mod receipt;

pub use envelope::{Envelope, ResolvedRecipient};
pub use heartbeat::{CapabilityHeartbeat, ExtensionInfo, Supports};
pub use inbox_item::InboxItem;
pub use receipt::Receipt;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the recipient extension hands the payload to its model conversation:
/// interrupt the current turn (`steer`) or queue after it (`followUp`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliverAs {
    #[default]
    #[serde(rename = "steer")]
    Steer,
    #[serde(rename = "followUp")]
    FollowUp,
}

impl DeliverAs {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Steer => "steer",
            Self::FollowUp => "followUp",
        }
    }
}

impl fmt::Display for DeliverAs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliverAs {
    type Err = String;

    /// Accepts the wire names plus the CLI verbs (`send` -> steer,
    /// `queue` -> followUp).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "steer" | "send" => Ok(Self::Steer),
            "followUp" | "follow-up" | "queue" => Ok(Self::FollowUp),
            other => Err(format!("unknown deliver-as value: {other}")),
        }
    }
}

/// Fleet role of an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Regular standalone agent
    #[default]
    Hippeus,
    /// Supervisor of a phalanx
    Polemarch,
    /// Member of a phalanx
    Hoplite,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hippeus => "hippeus",
            Self::Polemarch => "polemarch",
            Self::Hoplite => "hoplite",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hippeus" => Ok(Self::Hippeus),
            "polemarch" => Ok(Self::Polemarch),
            "hoplite" => Ok(Self::Hoplite),
            other => Err(format!("unknown role: {other}")),
        }
    }
}
