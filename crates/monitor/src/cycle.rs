use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use collector::{
    peer::{PeerClient, PeerSource},
    pipeline::BuildError,
    prober::{ActivityProber, ActivitySource},
    resolver::{AddressSource, ContractClient},
    roster::{self, RosterError},
    Collection, Collector,
};
use common::config::Config;
use derive_more::{Display, Error, From};
use itertools::Itertools;
use store::{changes, Changes, NodeRecord, OffsetDateTime, RecordSet, SnapshotStore, Statistics, StoreError};
use tokio::time::sleep;
use tracing::{error, info};

use crate::{
    export,
    notifier::Notifier,
    report::{self, CriticalAlert, MainReport},
};

/// Pause between two consecutive notifications of a single cycle.
const NOTIFICATION_PAUSE: Duration = Duration::from_secs(1);

/// Monitor construction errors.
#[derive(Debug, Display, Error, From)]
pub enum SetupError {
    /// Unable to set up the collector.
    Collector(BuildError),

    /// Unable to open the snapshot store.
    Store(StoreError),

    /// Unable to set up the notification channel.
    Http(reqwest::Error),
}

/// Monitoring cycle errors.
#[derive(Debug, Display, Error, From)]
pub enum CycleError {
    /// Node roster couldn't be loaded, no records were collected.
    Roster(RosterError),
}

/// Outcome of a completed monitoring cycle.
#[derive(Debug)]
pub struct CycleSummary {
    /// Records collected during the cycle.
    pub records: RecordSet,

    /// Changes since the previous cycle.
    pub changes: Changes,

    /// Path of the exported spreadsheet, if the export succeeded.
    pub export: Option<PathBuf>,
}

/// Node monitor that runs collection cycles and reports their results.
pub struct Monitor<A, P, T> {
    collector: Collector<A, P, T>,
    store: SnapshotStore,
    notifier: Notifier,
    roster_path: PathBuf,
    results_dir: PathBuf,
    detailed_report_limit: usize,
    pause: Duration,
}

impl Monitor<ContractClient, PeerClient, ActivityProber> {
    pub fn from_config(config: &Config) -> Result<Self, SetupError> {
        let store = SnapshotStore::new(
            &config.storage.history_dir,
            config.storage.history_capacity,
        )?;

        Ok(Self::new(
            Collector::from_config(config)?,
            store,
            Notifier::new(config.telegram.as_ref(), &config.http)?,
            config,
        ))
    }
}

impl<A, P, T> Monitor<A, P, T>
where
    A: AddressSource + Send + Sync,
    P: PeerSource + Sync,
    T: ActivitySource + Sync,
{
    pub fn new(
        collector: Collector<A, P, T>,
        store: SnapshotStore,
        notifier: Notifier,
        config: &Config,
    ) -> Self {
        Self {
            collector,
            store,
            notifier,
            roster_path: config.monitor.roster_path.clone(),
            results_dir: config.storage.results_dir.clone(),
            detailed_report_limit: config.monitor.detailed_report_limit,
            pause: NOTIFICATION_PAUSE,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Run a single monitoring cycle.
    ///
    /// Only a roster loading failure aborts the cycle, in which case the
    /// snapshot store is left untouched. Other failures are logged and
    /// reported while the cycle continues.
    pub async fn run_cycle(&mut self) -> Result<CycleSummary, CycleError> {
        let started_at = OffsetDateTime::now_utc();

        info!("starting monitoring cycle");
        self.notifier.notify(&report::cycle_start(started_at)).await;

        let nodes = match roster::load(&self.roster_path) {
            Ok(nodes) => nodes,
            Err(err) => {
                error!(%err, path = %self.roster_path.display(), "unable to load node roster");

                let message = report::roster_error(&self.roster_path.display().to_string(), &err);
                self.notifier.notify(&message).await;

                return Err(err.into());
            }
        };

        let previous = self.store.load_previous();

        let Collection {
            records,
            resolution_error,
        } = self.collector.collect(&nodes).await;

        if let Some(err) = resolution_error {
            self.notifier.notify(&report::resolution_error(&err)).await;
        }

        let changes = changes::calculate(&records, previous.as_deref());

        log_summary(&records, &changes);

        let export = match export::export(&self.results_dir, &records, &changes, started_at) {
            Ok(path) => Some(path),
            Err(err) => {
                error!(%err, "unable to export spreadsheet");
                None
            }
        };

        self.send_reports(&records, &changes, export.as_deref(), started_at)
            .await;

        if let Err(err) = self.store.save_current(&records) {
            error!(%err, "unable to save current snapshot");
        }

        if let Err(err) = self
            .store
            .append_history(&records, OffsetDateTime::now_utc())
        {
            error!(%err, "unable to append snapshot to history");
        }

        info!("monitoring cycle completed");

        Ok(CycleSummary {
            records,
            changes,
            export,
        })
    }

    /// Send the cycle reports.
    ///
    /// If the main report can't be delivered, the remaining reports are skipped.
    async fn send_reports(
        &self,
        records: &[NodeRecord],
        changes: &Changes,
        export: Option<&Path>,
        now: OffsetDateTime,
    ) {
        let main_report = MainReport {
            records,
            changes,
            now,
        };

        if let Err(err) = self.notifier.send_message(&main_report.to_string()).await {
            error!(%err, "unable to send main report");
            return;
        }

        if let Some(alert) = CriticalAlert::new(records) {
            sleep(self.pause).await;
            self.notifier.notify(&alert.to_string()).await;
        }

        if let Some(path) = export {
            sleep(self.pause * 2).await;

            if let Err(err) = self
                .notifier
                .send_document(path, &report::document_caption(now))
                .await
            {
                error!(%err, "unable to send spreadsheet");
            }
        }

        if records.len() <= self.detailed_report_limit {
            sleep(self.pause * 2).await;
            self.notifier.notify(&report::detailed_report(records)).await;
        }

        info!("cycle reports sent");
    }
}

/// Log the main statistics of a record set.
fn log_summary(records: &[NodeRecord], changes: &Changes) {
    let stats = Statistics::from_records(records);

    info!(
        total = stats.total,
        online = stats.online,
        with_address = stats.with_address,
        total_wins = stats.total_wins,
        very_active = stats.activity.very_active,
        active = stats.activity.active,
        warning = stats.activity.warning,
        problem = stats.activity.problem,
        no_data = stats.activity.unknown,
        "cycle summary"
    );

    for (class, hardware) in &stats.hardware {
        info!(
            hardware = %class,
            online = hardware.online,
            total = hardware.total,
            wins = hardware.wins,
            "hardware summary"
        );
    }

    let changed = records
        .iter()
        .filter(|record| {
            changes
                .get(&record.id)
                .map_or(false, |change| change.is_significant())
        })
        .map(|record| record.custom_name.as_str())
        .join(", ");

    if !changed.is_empty() {
        info!(nodes = %changed, "nodes changed since previous cycle");
    }
}
