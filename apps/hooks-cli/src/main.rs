//! # hooks-cli
//!
//! Command-line tools around repository webhook events:
//! - `hooks classify` — validate an event name/type pair, or list them all
//! - `hooks secret repository/workflow` — derive or verify webhook secrets
//! - `hooks report` — render the status report of a stored event record

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hooks_event::EngineConfig;
use tracing_subscriber::EnvFilter;

/// Repository hooks CLI.
#[derive(Parser)]
#[command(name = "hooks", version, about)]
struct Cli {
    /// Engine configuration file.
    #[arg(long, default_value = "hooks.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an event classification.
    Classify {
        /// Event name (push, pull-request, manual, ...).
        name: Option<String>,
        /// Event type; empty when the name has no subtype.
        #[arg(long = "type", default_value = "")]
        event_type: String,
        /// Print every valid (name, type) pair.
        #[arg(long)]
        list: bool,
    },
    /// Derive or verify webhook secrets.
    Secret {
        #[command(subcommand)]
        command: commands::secret::SecretCommands,
    },
    /// Render the status report of an event record.
    Report {
        /// Path to the JSON record.
        record: PathBuf,
        /// UI base URL (defaults to the configured one).
        #[arg(long)]
        ui_url: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't mix with command output on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("hooks_event=info".parse()?)
                .add_directive("hooks_cli=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load_or_default(&cli.config);

    match &cli.command {
        Commands::Classify {
            name,
            event_type,
            list,
        } => commands::classify::execute(name.as_deref(), event_type, *list),
        Commands::Secret { command } => commands::secret::execute(command),
        Commands::Report { record, ui_url } => {
            commands::report::execute(record, ui_url.as_deref().unwrap_or(&config.ui_url))
        }
    }
}
