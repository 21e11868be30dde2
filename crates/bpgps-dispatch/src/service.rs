use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use bpgps_util::now_millis;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::address::preview;
use crate::config::{ServiceConfig, CONFIG_FILE_NAME};
use crate::error::{HubError, NegotiateError, PrefsError, ServiceStopped};
use crate::history::{HistoryLog, HISTORY_FILE_NAME};
use crate::hub::{DispatchMessage, HubConnector, HubEvent, HubHandle, HubOptions};
use crate::identity::OfficerId;
use crate::navigation::NavigationLauncher;
use crate::negotiate::{Negotiation, Negotiator};
use crate::prefs::{Preferences, PREFS_FILE_NAME};
use crate::router::{Decision, DispatchRouter};
use crate::status::{
    ConnectionState, Notifier, StatusCode, StatusReporter, StatusStore, StatusUpdate,
    STATUS_FILE_NAME,
};

const HUB_EVENT_QUEUE_SIZE: usize = 64;
const COMMAND_QUEUE_SIZE: usize = 16;
const HISTORY_CHANNEL_CAPACITY: usize = 16;
const PREVIEW_CHARS: usize = 40;

#[derive(Clone, Debug)]
pub struct StoragePaths {
    pub config: PathBuf,
    pub prefs: PathBuf,
    pub status: PathBuf,
    pub history: PathBuf,
}

impl StoragePaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            config: dir.join(CONFIG_FILE_NAME),
            prefs: dir.join(PREFS_FILE_NAME),
            status: dir.join(STATUS_FILE_NAME),
            history: dir.join(HISTORY_FILE_NAME),
        }
    }

    pub fn default_location() -> Self {
        Self::in_dir(&bpgps_util::state_dir())
    }
}

pub struct Collaborators {
    pub negotiator: Arc<dyn Negotiator>,
    pub connector: Arc<dyn HubConnector>,
    pub launcher: Arc<dyn NavigationLauncher>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug)]
pub enum ServiceCommand {
    SetOfficer(String),
    Stop,
}

/// "Re-read the history log now."
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryUpdated;

enum Internal {
    Negotiated {
        attempt: u64,
        result: Result<Negotiation, NegotiateError>,
    },
    HubOpened {
        attempt: u64,
        result: Result<Box<dyn HubHandle>, HubError>,
    },
    ReconnectDue,
    SettleStatus,
}

#[derive(Clone)]
pub struct ServiceHandle {
    commands: mpsc::Sender<ServiceCommand>,
    status: broadcast::Sender<StatusUpdate>,
    history: broadcast::Sender<HistoryUpdated>,
    state: watch::Receiver<ConnectionState>,
}

impl ServiceHandle {
    pub async fn set_officer(&self, raw: &str) -> Result<(), ServiceStopped> {
        self.commands
            .send(ServiceCommand::SetOfficer(raw.to_string()))
            .await
            .map_err(|_| ServiceStopped)
    }

    pub async fn stop(&self) -> Result<(), ServiceStopped> {
        self.commands
            .send(ServiceCommand::Stop)
            .await
            .map_err(|_| ServiceStopped)
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusUpdate> {
        self.status.subscribe()
    }

    pub fn subscribe_history(&self) -> broadcast::Receiver<HistoryUpdated> {
        self.history.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

/// Long-lived owner of the connection lifecycle and dispatch handling.
///
/// Everything that mutates state runs on the task that calls [`run`]:
/// commands, hub events and completions of spawned work arrive on queues and
/// are handled one at a time. Negotiation, hub start and timers run in
/// spawned tasks tied to one cancellation token.
///
/// [`run`]: DispatchService::run
pub struct DispatchService {
    config: ServiceConfig,
    officer: OfficerId,
    prefs: Preferences,
    router: DispatchRouter,
    reporter: StatusReporter,
    negotiator: Arc<dyn Negotiator>,
    connector: Arc<dyn HubConnector>,
    launcher: Arc<dyn NavigationLauncher>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    history_tx: broadcast::Sender<HistoryUpdated>,
    hub: Option<Box<dyn HubHandle>>,
    /// The current attempt's hub reported a close before its handle arrived.
    closed_early: bool,
    reconnect_pending: bool,
    attempt: u64,
    shutdown: CancellationToken,
    commands_rx: mpsc::Receiver<ServiceCommand>,
    hub_tx: mpsc::Sender<(u64, HubEvent)>,
    hub_rx: mpsc::Receiver<(u64, HubEvent)>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
}

impl DispatchService {
    pub fn new(
        config: ServiceConfig,
        paths: StoragePaths,
        collaborators: Collaborators,
    ) -> (Self, ServiceHandle) {
        let prefs = Preferences::new(paths.prefs);
        let officer = prefs.officer_id();
        let history = HistoryLog::with_cap(paths.history, config.history_cap);
        let router = DispatchRouter::new(&config, history);
        let reporter = StatusReporter::new(StatusStore::new(paths.status), collaborators.notifier);

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (hub_tx, hub_rx) = mpsc::channel(HUB_EVENT_QUEUE_SIZE);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (history_tx, _) = broadcast::channel(HISTORY_CHANNEL_CAPACITY);

        let handle = ServiceHandle {
            commands: commands_tx,
            status: reporter.sender(),
            history: history_tx.clone(),
            state: state_rx,
        };
        let service = Self {
            config,
            officer,
            prefs,
            router,
            reporter,
            negotiator: collaborators.negotiator,
            connector: collaborators.connector,
            launcher: collaborators.launcher,
            state: ConnectionState::Idle,
            state_tx,
            history_tx,
            hub: None,
            closed_early: false,
            reconnect_pending: false,
            attempt: 0,
            shutdown: CancellationToken::new(),
            commands_rx,
            hub_tx,
            hub_rx,
            internal_tx,
            internal_rx,
        };
        (service, handle)
    }

    /// Runs until [`ServiceHandle::stop`] is called or every handle is
    /// dropped. Without a stored officer the service stays idle until
    /// [`ServiceHandle::set_officer`] provides one, unless it is configured to
    /// navigate for unassigned sessions.
    pub async fn run(mut self) {
        if self.officer.is_unset() && !self.config.navigate_when_unassigned {
            info!("no officer signed in; waiting for one");
        } else {
            info!(officer = %self.officer, "dispatch service starting");
            self.start();
        }
        loop {
            tokio::select! {
                command = self.commands_rx.recv() => match command {
                    Some(ServiceCommand::SetOfficer(raw)) => self.set_officer(&raw),
                    Some(ServiceCommand::Stop) | None => break,
                },
                Some((attempt, event)) = self.hub_rx.recv() => self.on_hub_event(attempt, event).await,
                Some(internal) = self.internal_rx.recv() => self.on_internal(internal).await,
            }
        }
        self.teardown().await;
    }

    fn start(&mut self) {
        if self.state != ConnectionState::Idle {
            return;
        }
        self.set_state(ConnectionState::Negotiating);
        self.reporter.persistent("Connecting to dispatch...");
        self.emit(StatusCode::Starting, "Initializing");
        self.negotiate();
    }

    fn negotiate(&mut self) {
        self.set_state(ConnectionState::Negotiating);
        self.reporter.persistent("Negotiating connection...");
        self.emit(StatusCode::Connecting, "Negotiating with server");

        self.attempt += 1;
        let attempt = self.attempt;
        let negotiator = Arc::clone(&self.negotiator);
        let tx = self.internal_tx.clone();
        let token = self.shutdown.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = negotiator.negotiate() => {
                    let _ = tx.send(Internal::Negotiated { attempt, result });
                }
            }
        });
    }

    fn connect(&mut self, negotiation: Negotiation) {
        self.set_state(ConnectionState::Connecting);
        self.reporter.persistent("Connecting to dispatch...");
        self.emit(StatusCode::Connecting, "Establishing connection");

        let attempt = self.attempt;
        self.closed_early = false;
        let options = HubOptions::from_negotiation(&negotiation, &self.config);
        let handshake = options.handshake_timeout;
        let connector = Arc::clone(&self.connector);
        let events = self.forward_hub_events(attempt);
        let tx = self.internal_tx.clone();
        let token = self.shutdown.child_token();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => return,
                opened = tokio::time::timeout(handshake, connector.connect(options, events)) => {
                    match opened {
                        Ok(result) => result,
                        Err(_) => Err(HubError::Start(format!(
                            "handshake timed out after {}s",
                            handshake.as_secs()
                        ))),
                    }
                }
            };
            let _ = tx.send(Internal::HubOpened { attempt, result });
        });
    }

    async fn on_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Negotiated { attempt, result } => {
                if attempt != self.attempt || self.state != ConnectionState::Negotiating {
                    debug!(attempt, "discarding stale negotiation result");
                    return;
                }
                match result {
                    Ok(negotiation) => self.connect(negotiation),
                    Err(err) => {
                        warn!("negotiation failed: {err}");
                        self.fail(StatusCode::ConnectionFailed);
                    }
                }
            }
            Internal::HubOpened { attempt, result } => {
                if attempt != self.attempt || self.state != ConnectionState::Connecting {
                    debug!(attempt, "discarding stale hub connection");
                    if let Ok(mut hub) = result {
                        if let Err(err) = hub.stop().await {
                            warn!("failed to stop stale hub: {err}");
                        }
                    }
                    return;
                }
                match result {
                    Ok(mut hub) if self.closed_early => {
                        if let Err(err) = hub.stop().await {
                            warn!("failed to stop closed hub: {err}");
                        }
                        self.disconnected();
                    }
                    Ok(hub) => {
                        self.hub = Some(hub);
                        self.set_state(ConnectionState::Connected);
                        self.reporter.persistent("Connected, listening for dispatches");
                        self.emit(StatusCode::Connected, "Listening for dispatches");
                    }
                    Err(err @ HubError::Setup(_)) => {
                        warn!("{err}");
                        self.fail(StatusCode::SetupFailed);
                    }
                    Err(err) => {
                        warn!("{err}");
                        self.fail(StatusCode::ConnectionFailed);
                    }
                }
            }
            Internal::ReconnectDue => {
                self.reconnect_pending = false;
                if matches!(
                    self.state,
                    ConnectionState::Failed | ConnectionState::Disconnected
                ) {
                    self.negotiate();
                }
            }
            Internal::SettleStatus => {
                if self.state == ConnectionState::Connected {
                    self.emit(StatusCode::Connected, "Listening for dispatches");
                }
            }
        }
    }

    async fn on_hub_event(&mut self, attempt: u64, event: HubEvent) {
        if attempt != self.attempt {
            debug!(attempt, "dropping event from a superseded hub");
            return;
        }
        match event {
            HubEvent::Dispatch(message) => self.handle_dispatch(message).await,
            HubEvent::Notice(name) => {
                self.reporter.persistent(&format!("Server event: {name}"));
                self.emit(StatusCode::Connected, &format!("Server event: {name}"));
            }
            HubEvent::Closed(reason) => {
                match reason {
                    Some(reason) => warn!("hub connection closed: {reason}"),
                    None => warn!("hub connection closed"),
                }
                match self.state {
                    ConnectionState::Connecting => self.closed_early = true,
                    ConnectionState::Connected => {
                        self.hub = None;
                        self.disconnected();
                    }
                    state => debug!("ignoring close while {state:?}"),
                }
            }
        }
    }

    fn disconnected(&mut self) {
        self.set_state(ConnectionState::Disconnected);
        self.reporter.persistent("Connection lost");
        self.emit(StatusCode::Disconnected, "Reconnecting...");
        self.schedule_reconnect();
    }

    /// Gives one hub attempt its own sender; events reach the service tagged
    /// with that attempt.
    fn forward_hub_events(&self, attempt: u64) -> mpsc::Sender<HubEvent> {
        let (tx, mut rx) = mpsc::channel(HUB_EVENT_QUEUE_SIZE);
        let hub_tx = self.hub_tx.clone();
        let token = self.shutdown.child_token();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                if hub_tx.send((attempt, event)).await.is_err() {
                    break;
                }
            }
        });
        tx
    }

    async fn handle_dispatch(&mut self, message: DispatchMessage) {
        match self.router.route(&message, &self.officer, now_millis()) {
            Decision::Ignored => debug!("ignoring dispatch without an address"),
            Decision::Debounced { address } => debug!("debounced dispatch for {address}"),
            Decision::Navigate(routed) => {
                if routed.recorded {
                    self.history_updated();
                }
                let address = routed.entry.address;
                info!(officer = %self.officer, "dispatch received: {address}");
                self.reporter.notifier().dispatch(&address);
                if let Err(err) = self.launcher.launch(&address).await {
                    warn!("navigation launch failed for {address}: {err}");
                    self.reporter.persistent("Unable to open navigation");
                    self.emit(StatusCode::Connected, "Navigation app failed to open");
                }
                self.emit(
                    StatusCode::DispatchReceived,
                    &format!("Opening navigation: {}", preview(&address, PREVIEW_CHARS)),
                );
                self.schedule_settle();
            }
            Decision::OtherOfficer(routed) => {
                if routed.recorded {
                    self.history_updated();
                }
                let other = if routed.entry.officer_id.is_empty() {
                    "unassigned"
                } else {
                    routed.entry.officer_id.as_str()
                };
                let detail = format!("Dispatch for officer {other}");
                self.emit(StatusCode::Connected, &detail);
                self.schedule_settle();
            }
        }
    }

    fn set_officer(&mut self, raw: &str) {
        match self.prefs.set_officer_id(raw) {
            Ok(officer) => {
                info!(officer = %officer, "officer updated");
                self.officer = officer;
            }
            Err(PrefsError::InvalidOfficerId) => {
                warn!("ignoring blank officer id");
                return;
            }
            Err(err) => {
                warn!("{err}");
                self.officer = OfficerId::new(raw);
            }
        }
        self.start();
    }

    fn fail(&mut self, code: StatusCode) {
        let secs = self.config.reconnect_delay().as_secs();
        self.set_state(ConnectionState::Failed);
        self.reporter
            .persistent(&format!("Connection failed, retrying in {secs}s"));
        self.emit(code, &format!("Retrying in {secs}s"));
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect_pending {
            debug!("reconnect already scheduled");
            return;
        }
        self.reconnect_pending = true;
        self.spawn_after(self.config.reconnect_delay(), Internal::ReconnectDue);
    }

    fn schedule_settle(&self) {
        self.spawn_after(self.config.status_settle(), Internal::SettleStatus);
    }

    fn spawn_after(&self, delay: Duration, message: Internal) {
        let tx = self.internal_tx.clone();
        let token = self.shutdown.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(message);
                }
            }
        });
    }

    async fn teardown(&mut self) {
        self.set_state(ConnectionState::Stopped);
        self.reporter.persistent("Dispatch service stopped");
        self.emit(StatusCode::Stopped, "Service stopped");
        if let Some(mut hub) = self.hub.take() {
            if let Err(err) = hub.stop().await {
                warn!("hub stop failed: {err}");
            }
        }
        self.shutdown.cancel();
        info!("dispatch service stopped");
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "connection state");
        }
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn emit(&mut self, code: StatusCode, detail: &str) {
        self.reporter.emit(code, detail, self.state);
    }

    fn history_updated(&self) {
        let _ = self.history_tx.send(HistoryUpdated);
    }
}
