//! zeus-msg - one-shot send tool for the zeus agent bus

mod send;
mod wait;

use clap::{Parser, Subcommand};
use zeus_core::state_dir::StateDir;

/// One-shot send tool for the zeus inter-agent message bus
#[derive(Parser, Debug)]
#[command(name = "zeus-msg")]
#[command(about = "Send messages onto the durable zeus agent bus")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Enqueue a message for one or more agents
    Send(send::SendArgs),
}

fn main() {
    let cli = Cli::parse();
    let state = StateDir::resolve();
    let event_log = zeus_core::logging::init(&state);

    let result = match cli.command {
        Commands::Send(args) => send::execute(&state, &event_log, args),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
