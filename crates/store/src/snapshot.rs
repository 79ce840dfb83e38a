//! JSON snapshot persistence.
//!
//! The store keeps two files in its directory: the record set of the latest
//! cycle, which is overwritten every cycle, and a capped history of
//! timestamped record sets.

use std::{
    fs, io,
    io::BufWriter,
    path::{Path, PathBuf},
};

use derive_more::{Display, Error, From};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tempfile::{NamedTempFile, PersistError};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{NodeRecord, RecordSet};

/// File name of the latest record set.
const CURRENT_FILE: &str = "current_data.json";

/// File name of the record set history.
const HISTORY_FILE: &str = "history.json";

/// Snapshot store errors.
#[derive(Debug, Display, Error, From)]
pub enum StoreError {
    /// IO-related error.
    Io(io::Error),

    /// JSON (de)serialization error.
    Json(serde_json::Error),

    /// Unable to move a temporary file in place.
    Persist(PersistError),
}

/// A single timestamped history entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Time at which the entry was appended.
    #[serde(with = "crate::timestamp")]
    pub timestamp: OffsetDateTime,

    /// Record set of the corresponding cycle.
    pub data: RecordSet,
}

/// Append-only history with FIFO eviction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct History {
    entries: Vec<HistoryEntry>,
    capacity: usize,
}

impl History {
    pub fn new(entries: Vec<HistoryEntry>, capacity: usize) -> Self {
        let mut history = Self { entries, capacity };
        history.evict();
        history
    }

    /// Append a new entry, evicting the oldest entries if the capacity is exceeded.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
        self.evict();
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict(&mut self) {
        let overflow = self.entries.len().saturating_sub(self.capacity);
        self.entries.drain(..overflow);
    }
}

/// File-backed snapshot store.
pub struct SnapshotStore {
    current_path: PathBuf,
    history_path: PathBuf,
    capacity: usize,
}

impl SnapshotStore {
    /// Create a new store in the provided directory, creating the directory if necessary.
    pub fn new<P: AsRef<Path>>(dir: P, capacity: usize) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        Ok(Self {
            current_path: dir.join(CURRENT_FILE),
            history_path: dir.join(HISTORY_FILE),
            capacity,
        })
    }

    /// Load the record set saved by the previous cycle.
    ///
    /// Returns [`None`] if there is no previous record set or it cannot be read.
    pub fn load_previous(&self) -> Option<RecordSet> {
        match read_json::<RecordSet>(&self.current_path) {
            Ok(Some(records)) => {
                info!(nodes = records.len(), "loaded previous snapshot");
                Some(records)
            }
            Ok(None) => {
                debug!(path = %self.current_path.display(), "no previous snapshot");
                None
            }
            Err(err) => {
                warn!(%err, "unable to load previous snapshot");
                None
            }
        }
    }

    /// Overwrite the current record set.
    pub fn save_current(&self, records: &[NodeRecord]) -> Result<(), StoreError> {
        write_json(&self.current_path, &records)?;
        info!("current snapshot saved");
        Ok(())
    }

    /// Load the record set history.
    pub fn load_history(&self) -> Result<History, StoreError> {
        let entries = read_json(&self.history_path)?.unwrap_or_default();
        Ok(History::new(entries, self.capacity))
    }

    /// Append a record set to the history.
    ///
    /// Returns the count of history entries after the append.
    pub fn append_history(
        &self,
        records: &[NodeRecord],
        timestamp: OffsetDateTime,
    ) -> Result<usize, StoreError> {
        let mut history = self.load_history()?;

        history.push(HistoryEntry {
            timestamp,
            data: records.to_vec(),
        });

        write_json(&self.history_path, history.entries())?;
        info!(entries = history.len(), "snapshot appended to history");

        Ok(history.len())
    }
}

/// Read a JSON file, returning [`None`] if it doesn't exist.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Write a JSON file through a temporary file in the same directory.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut file = NamedTempFile::new_in(dir)?;

    {
        let mut writer = BufWriter::new(file.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)?;
        io::Write::flush(&mut writer)?;
    }

    file.persist(path)?;
    Ok(())
}
