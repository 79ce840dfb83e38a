use common::config::Config;
use derive_more::{Display, Error, From};
use tracing::info;

use crate::cycle::{CycleError, Monitor, SetupError};

/// `run` command errors.
#[derive(Debug, Display, Error, From)]
pub enum RunError {
    /// Unable to set up the monitor.
    Setup(SetupError),

    /// Monitoring cycle failed.
    Cycle(CycleError),
}

/// Run a single monitoring cycle.
pub async fn run(config: Config) -> Result<(), RunError> {
    let mut monitor = Monitor::from_config(&config)?;

    let summary = monitor.run_cycle().await?;

    let changed = summary
        .changes
        .values()
        .filter(|change| change.is_significant())
        .count();

    info!(
        nodes = summary.records.len(),
        changed,
        export = ?summary.export,
        "single monitoring cycle finished"
    );

    Ok(())
}
