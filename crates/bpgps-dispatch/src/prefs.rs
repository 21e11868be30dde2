use std::path::{Path, PathBuf};

use bpgps_util::{read_optional, write_json_atomic};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PrefsError;
use crate::identity::{is_valid, OfficerId};

pub(crate) const PREFS_FILE_NAME: &str = "prefs.json";

#[derive(Serialize, Deserialize, Default)]
#[serde(default)]
struct PersistedPrefs {
    officer_id: String,
}

/// Durable key-value preferences. Currently holds only the signed-in officer.
#[derive(Clone, Debug)]
pub struct Preferences {
    path: PathBuf,
}

impl Preferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn officer_id(&self) -> OfficerId {
        OfficerId::new(&self.load().officer_id)
    }

    pub fn set_officer_id(&self, raw: &str) -> Result<OfficerId, PrefsError> {
        if !is_valid(Some(raw)) {
            return Err(PrefsError::InvalidOfficerId);
        }
        let officer = OfficerId::new(raw);
        let mut prefs = self.load();
        prefs.officer_id = officer.as_str().to_string();
        write_json_atomic(&self.path, &prefs)?;
        Ok(officer)
    }

    pub fn clear_officer_id(&self) -> Result<(), PrefsError> {
        let mut prefs = self.load();
        prefs.officer_id.clear();
        write_json_atomic(&self.path, &prefs)?;
        Ok(())
    }

    fn load(&self) -> PersistedPrefs {
        match read_optional(&self.path) {
            Ok(Some(data)) => serde_json::from_str(&data).unwrap_or_else(|err| {
                warn!("Failed to parse {}: {err}", self.path.display());
                PersistedPrefs::default()
            }),
            Ok(None) => PersistedPrefs::default(),
            Err(err) => {
                warn!("Failed to read {}: {err}", self.path.display());
                PersistedPrefs::default()
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BootAction {
    StartService(OfficerId),
    PromptForOfficer,
}

/// What to do when the device comes up: resume listening for a known officer,
/// or ask someone to sign in first.
pub fn boot_action(officer: &OfficerId) -> BootAction {
    if officer.is_unset() {
        BootAction::PromptForOfficer
    } else {
        BootAction::StartService(officer.clone())
    }
}
