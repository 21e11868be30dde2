use std::{
    io,
    path::Path,
    time::Duration,
};

use bpgps_util::{env_flag, env_or, env_u64, read_optional, write_json_atomic};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub(crate) const CONFIG_FILE_NAME: &str = "config.json";

pub const DEFAULT_NEGOTIATE_URL: &str = "https://bp-gps-app.azurewebsites.net/api/negotiate";
pub const DEFAULT_CITY_STATE: &str = "Baton Rouge, LA";
pub const DEFAULT_NAV_COMMAND: &str = "xdg-open";

const NEGOTIATE_URL_ENV: &str = "BPGPS_NEGOTIATE_URL";
const CITY_STATE_ENV: &str = "BPGPS_DEFAULT_CITY_STATE";
const NAVIGATE_UNASSIGNED_ENV: &str = "BPGPS_NAVIGATE_WHEN_UNASSIGNED";
const NAV_COMMAND_ENV: &str = "BPGPS_NAV_COMMAND";
const RECONNECT_DELAY_ENV: &str = "BPGPS_RECONNECT_DELAY_MS";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub negotiate_url: String,
    pub default_city_state: String,
    /// Navigate for every dispatch while no officer is signed in.
    pub navigate_when_unassigned: bool,
    pub nav_command: String,
    pub reconnect_delay_ms: u64,
    pub debounce_ms: u64,
    pub status_settle_ms: u64,
    pub negotiate_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub server_timeout_ms: u64,
    pub history_cap: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            negotiate_url: DEFAULT_NEGOTIATE_URL.into(),
            default_city_state: DEFAULT_CITY_STATE.into(),
            navigate_when_unassigned: false,
            nav_command: DEFAULT_NAV_COMMAND.into(),
            reconnect_delay_ms: 5_000,
            debounce_ms: 3_000,
            status_settle_ms: 3_000,
            negotiate_timeout_ms: 30_000,
            handshake_timeout_ms: 60_000,
            server_timeout_ms: 300_000,
            history_cap: 50,
        }
    }
}

impl ServiceConfig {
    /// Defaults, overlaid by the file at `path`, overlaid by env.
    pub fn load_from(path: &Path) -> Self {
        let mut cfg = match read_optional(path) {
            Ok(Some(data)) => match serde_json::from_str::<ServiceConfig>(&data) {
                Ok(file_cfg) => file_cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}", path.display());
                    ServiceConfig::default()
                }
            },
            Ok(None) => ServiceConfig::default(),
            Err(err) => {
                warn!("Failed to read {}: {err}", path.display());
                ServiceConfig::default()
            }
        };
        cfg.apply_env();
        cfg.fill_blanks();
        cfg
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        write_json_atomic(path, self)
    }

    fn apply_env(&mut self) {
        self.negotiate_url = env_or(NEGOTIATE_URL_ENV, &self.negotiate_url);
        self.default_city_state = env_or(CITY_STATE_ENV, &self.default_city_state);
        self.nav_command = env_or(NAV_COMMAND_ENV, &self.nav_command);
        if let Some(flag) = env_flag(NAVIGATE_UNASSIGNED_ENV) {
            self.navigate_when_unassigned = flag;
        }
        if let Some(delay) = env_u64(RECONNECT_DELAY_ENV) {
            self.reconnect_delay_ms = delay;
        }
    }

    fn fill_blanks(&mut self) {
        let defaults = ServiceConfig::default();
        if self.negotiate_url.trim().is_empty() {
            self.negotiate_url = defaults.negotiate_url;
        }
        if self.default_city_state.trim().is_empty() {
            self.default_city_state = defaults.default_city_state;
        }
        if self.nav_command.trim().is_empty() {
            self.nav_command = defaults.nav_command;
        }
        if self.history_cap == 0 {
            self.history_cap = defaults.history_cap;
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn status_settle(&self) -> Duration {
        Duration::from_millis(self.status_settle_ms)
    }

    pub fn negotiate_timeout(&self) -> Duration {
        Duration::from_millis(self.negotiate_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_millis(self.server_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ServiceConfig::load_from(&dir.path().join("config.json"));
        assert_eq!(cfg.debounce_ms, 3_000);
        assert_eq!(cfg.history_cap, 50);
        assert_eq!(cfg.handshake_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.server_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn partial_file_keeps_defaults_for_absent_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"debounce_ms": 1500, "default_city_state": ""}"#).unwrap();

        let cfg = ServiceConfig::load_from(&path);
        assert_eq!(cfg.debounce_ms, 1_500);
        assert_eq!(cfg.status_settle_ms, 3_000);
        assert_eq!(cfg.default_city_state, DEFAULT_CITY_STATE);
    }

    #[test]
    fn saved_file_is_read_back_from_the_same_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let cfg = ServiceConfig {
            nav_command: "open-maps --new".into(),
            reconnect_delay_ms: 1_000,
            ..ServiceConfig::default()
        };
        cfg.save_to(&path).unwrap();

        let loaded = ServiceConfig::load_from(&path);
        assert_eq!(loaded.nav_command, "open-maps --new");
        assert_eq!(loaded.debounce_ms, 3_000);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(ServiceConfig::load_from(&path).history_cap, 50);
    }
}
