use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI configuration.
#[derive(Parser)]
#[command(about, version)]
pub(crate) struct Cli {
    /// Configuration file path.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Selected subcommand.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a single monitoring cycle.
    Run,

    /// Run monitoring cycles continuously, once per configured interval.
    Watch,

    /// Validate the node roster and send a test notification.
    Check,
}
