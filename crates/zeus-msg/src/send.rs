//! Send command implementation

use crate::wait::{WaitResult, wait_for_removal};
use anyhow::{Context, Result};
use clap::Args;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use zeus_core::agent_id::canonical_non_empty;
use zeus_core::event_log::{EventFields, EventLogConfig, emit_event_best_effort};
use zeus_core::schema::{AgentRole, DeliverAs};
use zeus_core::state_dir::StateDir;
use zeus_dispatch::queue::{EnqueueRequest, enqueue};

/// Enqueue a message for one or more agents
#[derive(Args, Debug)]
pub struct SendArgs {
    /// Target address: `agent:<id>`, `hoplite:<id>`, `name:<display>`,
    /// `polemarch`, `phalanx`, or a raw display name
    #[arg(long)]
    to: String,

    /// Message text
    #[arg(long, conflicts_with_all = ["stdin", "file"])]
    text: Option<String>,

    /// Read message from stdin
    #[arg(long, conflicts_with = "file")]
    stdin: bool,

    /// Read message from a file
    #[arg(long)]
    file: Option<PathBuf>,

    /// Sender display name (default: ZEUS_AGENT_ID, else "operator")
    #[arg(long)]
    from: Option<String>,

    /// Delivery hint: steer (interrupt) or queue (after current turn)
    #[arg(long, default_value = "steer")]
    deliver_as: String,

    /// Block until the envelope has been fully delivered
    #[arg(long)]
    wait_delivery: bool,

    /// Timeout in seconds for --wait-delivery
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the send command; returns the process exit code.
pub fn execute(state: &StateDir, event_log: &EventLogConfig, args: SendArgs) -> Result<i32> {
    state
        .ensure_layout()
        .with_context(|| format!("State directory {} is not writable", state.root().display()))?;

    let message = read_message(&args)?;
    let deliver_as: DeliverAs = args
        .deliver_as
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let env_agent_id = std::env::var("ZEUS_AGENT_ID").unwrap_or_default();
    let source_name = args
        .from
        .clone()
        .or_else(|| canonical_non_empty(&env_agent_id))
        .unwrap_or_else(|| "operator".to_string());
    let source_agent_id = canonical_non_empty(&env_agent_id)
        .or_else(|| canonical_non_empty(&source_name))
        .unwrap_or_else(|| "operator".to_string());
    let source_role: AgentRole = std::env::var("ZEUS_ROLE")
        .ok()
        .and_then(|r| r.parse().ok())
        .unwrap_or_default();

    let envelope_id = enqueue(state, EnqueueRequest {
        source_agent_id: source_agent_id.clone(),
        source_name,
        source_role,
        target: args.to.clone(),
        message: message.clone(),
        deliver_as,
    })
    .context("Failed to enqueue message")?;

    emit_event_best_effort(event_log, EventFields {
        level: "info",
        source: "zeus-msg",
        action: "message_enqueued",
        agent_id: Some(source_agent_id),
        target: Some(args.to.clone()),
        message_id: Some(envelope_id.clone()),
        message_text: Some(message),
        ..Default::default()
    });

    if args.json {
        println!(
            "{}",
            serde_json::json!({
                "envelope_id": envelope_id,
                "target": args.to,
                "deliver_as": deliver_as.as_str(),
            })
        );
    }
    println!("ZEUS_MSG_ENQUEUED={envelope_id}");

    if !args.wait_delivery {
        return Ok(0);
    }

    match wait_for_removal(state, &envelope_id, Duration::from_secs(args.timeout))? {
        WaitResult::Delivered => {
            if !args.json {
                println!("Delivered.");
            }
            Ok(0)
        }
        WaitResult::Timeout => {
            eprintln!("Timed out after {}s waiting for delivery of {envelope_id}", args.timeout);
            Ok(2)
        }
    }
}

fn read_message(args: &SendArgs) -> Result<String> {
    if let Some(text) = &args.text {
        return Ok(text.clone());
    }
    if args.stdin {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read message from stdin")?;
        return Ok(buffer);
    }
    if let Some(path) = &args.file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read message from {}", path.display()));
    }
    anyhow::bail!("one of --text, --stdin or --file is required");
}
