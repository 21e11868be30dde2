//! Dispatch listener: keeps a hub connection to the dispatch backend alive,
//! routes incoming dispatches for the signed-in officer to navigation, and
//! keeps a short history of what was received.

pub mod address;
pub mod config;
pub mod error;
pub mod history;
pub mod hub;
pub mod identity;
pub mod navigation;
pub mod negotiate;
pub mod prefs;
pub mod router;
pub mod service;
pub mod status;

pub use config::ServiceConfig;
pub use error::{HubError, LaunchError, NegotiateError, PrefsError, ServiceStopped};
pub use history::{HistoryEntry, HistoryLog};
pub use hub::{DispatchMessage, HubConnector, HubEvent, HubHandle, HubOptions};
pub use identity::OfficerId;
pub use navigation::{CommandLauncher, NavigationLauncher};
pub use negotiate::{HttpNegotiator, Negotiation, Negotiator};
pub use prefs::{boot_action, BootAction, Preferences};
pub use router::{Decision, DispatchRouter};
pub use service::{
    Collaborators, DispatchService, HistoryUpdated, ServiceCommand, ServiceHandle, StoragePaths,
};
pub use status::{
    ConnectionState, LastStatus, Notifier, StatusCode, StatusStore, StatusUpdate, TracingNotifier,
};
