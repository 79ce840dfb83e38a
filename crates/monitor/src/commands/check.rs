use collector::roster::{self, RosterError};
use common::config::Config;
use derive_more::{Display, Error, From};
use tracing::{info, warn};

use crate::{
    notifier::{Notifier, NotifyError},
    report,
};

/// `check` command errors.
#[derive(Debug, Display, Error, From)]
pub enum CheckError {
    /// Node roster is invalid.
    Roster(RosterError),

    /// Unable to set up the notification channel.
    Http(reqwest::Error),

    /// Test notification couldn't be delivered.
    Notify(NotifyError),
}

/// Validate the node roster and deliver a test notification.
pub async fn check(config: Config) -> Result<(), CheckError> {
    let nodes = roster::load(&config.monitor.roster_path)?;

    info!(
        nodes = nodes.len(),
        path = %config.monitor.roster_path.display(),
        "node roster is valid"
    );

    let notifier = Notifier::new(config.telegram.as_ref(), &config.http)?;

    if !notifier.is_enabled() {
        warn!("telegram is not configured, the test message will only be logged");
    }

    notifier.send_message(&report::test_connection()).await?;

    info!("test notification delivered");

    Ok(())
}
