use std::{
    io,
    path::{Path, PathBuf},
};

use bpgps_util::{read_optional, write_json_atomic};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::identity::normalize;

pub(crate) const HISTORY_FILE_NAME: &str = "dispatch_history.json";
pub const MAX_HISTORY_SIZE: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub address: String,
    #[serde(rename = "officerId", default)]
    pub officer_id: String,
    #[serde(rename = "timestamp")]
    pub timestamp_millis: i64,
}

impl HistoryEntry {
    pub fn new(address: impl Into<String>, officer_id: impl Into<String>, timestamp_millis: i64) -> Self {
        Self {
            address: address.into(),
            officer_id: officer_id.into(),
            timestamp_millis,
        }
    }
}

/// Newest-first list of received dispatches, persisted as one JSON array.
///
/// Every mutation is a full read-modify-write of the file. There is no
/// cross-process lock; a concurrent writer can lose an update.
#[derive(Clone, Debug)]
pub struct HistoryLog {
    path: PathBuf,
    cap: usize,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_cap(path, MAX_HISTORY_SIZE)
    }

    pub fn with_cap(path: impl Into<PathBuf>, cap: usize) -> Self {
        Self {
            path: path.into(),
            cap: cap.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: HistoryEntry) -> io::Result<()> {
        let mut entries = self.load_all();
        entries.insert(0, entry);
        entries.truncate(self.cap);
        self.store(&entries)
    }

    /// Missing or unreadable history is treated as empty.
    pub fn load_all(&self) -> Vec<HistoryEntry> {
        let data = match read_optional(&self.path) {
            Ok(Some(data)) => data,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!("History load failed for {}: {err}", self.path.display());
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<HistoryEntry>>(&data) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("History load failed for {}: {err}", self.path.display());
                Vec::new()
            }
        }
    }

    pub fn load_for_officer(&self, officer_id: &str) -> Vec<HistoryEntry> {
        let officer = normalize(Some(officer_id));
        self.load_all()
            .into_iter()
            .filter(|entry| normalize(Some(&entry.officer_id)) == officer)
            .collect()
    }

    /// Removes every entry with this address and timestamp. Returns how many
    /// were removed.
    pub fn remove(&self, address: &str, timestamp_millis: i64) -> io::Result<usize> {
        self.retain(|entry| {
            !(entry.address == address && entry.timestamp_millis == timestamp_millis)
        })
    }

    pub fn clear_officer(&self, officer_id: &str) -> io::Result<usize> {
        let officer = normalize(Some(officer_id));
        self.retain(|entry| normalize(Some(&entry.officer_id)) != officer)
    }

    pub fn clear(&self) -> io::Result<()> {
        self.store(&[])
    }

    fn retain<F>(&self, keep: F) -> io::Result<usize>
    where
        F: Fn(&HistoryEntry) -> bool,
    {
        let mut entries = self.load_all();
        let before = entries.len();
        entries.retain(|entry| keep(entry));
        let removed = before - entries.len();
        if removed > 0 {
            self.store(&entries)?;
        }
        Ok(removed)
    }

    fn store(&self, entries: &[HistoryEntry]) -> io::Result<()> {
        write_json_atomic(&self.path, &entries)
    }
}
