use std::{fmt, path::PathBuf, sync::Arc};

use bpgps_util::{now_millis, read_optional, write_json_atomic};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

pub(crate) const STATUS_FILE_NAME: &str = "status.json";
const STATUS_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Starting,
    Connecting,
    Connected,
    Disconnected,
    ConnectionFailed,
    SetupFailed,
    #[serde(rename = "DISPATCH")]
    DispatchReceived,
    Stopped,
}

impl StatusCode {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Starting => "STARTING",
            StatusCode::Connecting => "CONNECTING",
            StatusCode::Connected => "CONNECTED",
            StatusCode::Disconnected => "DISCONNECTED",
            StatusCode::ConnectionFailed => "CONNECTION_FAILED",
            StatusCode::SetupFailed => "SETUP_FAILED",
            StatusCode::DispatchReceived => "DISPATCH",
            StatusCode::Stopped => "STOPPED",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatusCode::Starting => "Starting",
            StatusCode::Connecting => "Connecting",
            StatusCode::Connected => "Connected",
            StatusCode::Disconnected => "Disconnected",
            StatusCode::ConnectionFailed => "Connection failed",
            StatusCode::SetupFailed => "Setup failed",
            StatusCode::DispatchReceived => "Dispatch received",
            StatusCode::Stopped => "Stopped",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        [
            StatusCode::Starting,
            StatusCode::Connecting,
            StatusCode::Connected,
            StatusCode::Disconnected,
            StatusCode::ConnectionFailed,
            StatusCode::SetupFailed,
            StatusCode::DispatchReceived,
            StatusCode::Stopped,
        ]
        .into_iter()
        .find(|candidate| candidate.as_str() == code)
    }

    fn is_connection_lost(self) -> bool {
        matches!(self, StatusCode::Disconnected | StatusCode::ConnectionFailed)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Negotiating,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Stopped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub code: StatusCode,
    pub detail: String,
    pub state: ConnectionState,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastStatus {
    pub status: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub updated_at_unix_millis: i64,
}

impl LastStatus {
    pub fn code(&self) -> Option<StatusCode> {
        StatusCode::parse(&self.status)
    }
}

#[derive(Clone, Debug)]
pub struct StatusStore {
    path: PathBuf,
}

impl StatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn save(&self, code: StatusCode, detail: &str) -> std::io::Result<()> {
        let record = LastStatus {
            status: code.as_str().to_string(),
            detail: detail.to_string(),
            updated_at_unix_millis: now_millis(),
        };
        write_json_atomic(&self.path, &record)
    }

    pub fn load(&self) -> Option<LastStatus> {
        match read_optional(&self.path) {
            Ok(Some(data)) => match serde_json::from_str(&data) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!("Failed to parse {}: {err}", self.path.display());
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!("Failed to read {}: {err}", self.path.display());
                None
            }
        }
    }
}

/// The user-facing status surface: an always-present status line plus
/// one-shot alerts.
pub trait Notifier: Send + Sync {
    fn persistent(&self, text: &str);
    fn connection_lost(&self);
    fn dispatch(&self, address: &str);
}

#[derive(Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn persistent(&self, text: &str) {
        info!(target: "bpgps::status", "{text}");
    }

    fn connection_lost(&self) {
        warn!(target: "bpgps::status", "Connection to dispatch lost");
    }

    fn dispatch(&self, address: &str) {
        info!(target: "bpgps::status", "New dispatch: {address}");
    }
}

pub(crate) struct StatusReporter {
    store: StatusStore,
    tx: broadcast::Sender<StatusUpdate>,
    notifier: Arc<dyn Notifier>,
    last_code: Option<StatusCode>,
}

impl StatusReporter {
    pub(crate) fn new(store: StatusStore, notifier: Arc<dyn Notifier>) -> Self {
        let (tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            store,
            tx,
            notifier,
            last_code: None,
        }
    }

    pub(crate) fn sender(&self) -> broadcast::Sender<StatusUpdate> {
        self.tx.clone()
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub(crate) fn persistent(&self, text: &str) {
        self.notifier.persistent(text);
    }

    pub(crate) fn emit(&mut self, code: StatusCode, detail: &str, state: ConnectionState) {
        info!(code = code.as_str(), ?state, "{detail}");
        if let Err(err) = self.store.save(code, detail) {
            warn!("Failed to persist status: {err}");
        }
        let _ = self.tx.send(StatusUpdate {
            code,
            detail: detail.to_string(),
            state,
        });
        if code.is_connection_lost() && self.last_code != Some(code) {
            self.notifier.connection_lost();
        }
        self.last_code = Some(code);
    }
}
