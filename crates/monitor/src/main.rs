//! # Node monitor
//!
//! Node monitor periodically collects the state of every node listed in the
//! roster file, compares it with the previous cycle and reports the results
//! to a Telegram chat.
//!
//! # CLI subcommands
//!
//! - [`run`] runs a single monitoring cycle;
//! - [`watch`] runs monitoring cycles continuously, once per configured interval;
//! - [`check`] validates the roster and sends a test notification.
//!
//! [`run`]: commands::run
//! [`watch`]: commands::watch
//! [`check`]: commands::check
//!
//! # Monitoring cycle
//!
//! Each cycle loads the roster, collects a record set with the
//! [`Collector`](collector::Collector), computes changes against the previous
//! snapshot and sends the reports. The spreadsheet export is attached to the
//! reports as a document. The snapshot store is updated once all reports were sent.
//!
//! See the [`cycle`] module for more details.

#![deny(missing_docs)]

/// CLI configuration and available subcommands.
mod cli;

/// Subcommand implementations.
mod commands;

/// Monitoring cycle implementation.
mod cycle;

/// Spreadsheet export.
mod export;

/// Telegram notification channel.
mod notifier;

/// Notification message rendering.
mod report;

use clap::Parser;
use cli::{Cli, Command};
use common::{config::Config, logging};

/// Node monitor entrypoint.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let config = Config::new(cli.config)?;

    logging::init(&config);

    match cli.command {
        Command::Run => commands::run(config).await?,
        Command::Watch => commands::watch(config).await?,
        Command::Check => commands::check(config).await?,
    }

    Ok(())
}
