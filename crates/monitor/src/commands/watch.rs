use std::{io, time::Duration};

use common::config::Config;
use derive_more::{Display, Error, From};
use store::OffsetDateTime;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

use crate::{
    cycle::{Monitor, SetupError},
    report,
};

/// `watch` command errors.
#[derive(Debug, Display, Error, From)]
pub enum WatchError {
    /// Unable to set up the monitor.
    Setup(SetupError),

    /// Unable to listen for the shutdown signal.
    Signal(io::Error),
}

/// Run monitoring cycles until interrupted.
///
/// The first cycle starts immediately. A cycle that overruns the interval
/// delays the next one instead of triggering a burst of cycles.
pub async fn watch(config: Config) -> Result<(), WatchError> {
    let mut monitor = Monitor::from_config(&config)?;

    let minutes = config.monitor.interval_minutes.max(1);
    let mut interval = time::interval(Duration::from_secs(minutes * 60));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let startup = report::startup(
        minutes,
        monitor.notifier().is_enabled(),
        OffsetDateTime::now_utc(),
    );
    monitor.notifier().notify(&startup).await;

    info!(minutes, "continuous monitoring started, press Ctrl-C to stop");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            result = &mut shutdown => {
                result?;
                info!("shutdown requested");
                break;
            }
            _ = interval.tick() => {
                if let Err(err) = monitor.run_cycle().await {
                    error!(%err, "monitoring cycle failed");
                }

                info!(minutes, "waiting for the next cycle");
            }
        }
    }

    monitor
        .notifier()
        .notify(&report::shutdown(OffsetDateTime::now_utc()))
        .await;

    info!("monitoring stopped");

    Ok(())
}
