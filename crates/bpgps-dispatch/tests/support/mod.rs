#![allow(dead_code)]

use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use bpgps_dispatch::{
    Collaborators, DispatchService, HubConnector, HubError, HubEvent, HubHandle, HubOptions,
    LaunchError, NavigationLauncher, NegotiateError, Negotiation, Negotiator, Notifier,
    Preferences, ServiceConfig, ServiceHandle, StatusCode, StatusUpdate, StoragePaths,
};
use tokio::{
    sync::{broadcast, mpsc},
    time::Instant,
};

/// Fails the first `failures` calls, then hands out a fixed negotiation.
pub struct ScriptedNegotiator {
    failures_left: Mutex<u32>,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedNegotiator {
    pub fn failing(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures_left: Mutex::new(failures),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Negotiator for ScriptedNegotiator {
    async fn negotiate(&self) -> Result<Negotiation, NegotiateError> {
        self.calls.lock().unwrap().push(Instant::now());
        let mut left = self.failures_left.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            return Err(NegotiateError::Status(500));
        }
        Ok(Negotiation {
            url: "wss://hub.test/client/?hub=dispatch".into(),
            access_token: "token-1".into(),
        })
    }
}

#[derive(Default)]
pub struct FakeConnector {
    opened: Mutex<Vec<HubOptions>>,
    events: Mutex<Option<mpsc::Sender<HubEvent>>>,
    setup_failures: Mutex<u32>,
    early_closes: Mutex<u32>,
    stopped: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_setup(failures: u32) -> Arc<Self> {
        let connector = Self::default();
        *connector.setup_failures.lock().unwrap() = failures;
        Arc::new(connector)
    }

    /// The first `closes` connections report a close before `connect` returns.
    pub fn closing_during_handshake(closes: u32) -> Arc<Self> {
        let connector = Self::default();
        *connector.early_closes.lock().unwrap() = closes;
        Arc::new(connector)
    }

    pub fn opened(&self) -> Vec<HubOptions> {
        self.opened.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    pub async fn push(&self, event: HubEvent) {
        let sender = self
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("hub was never opened");
        sender.send(event).await.expect("service queue closed");
    }
}

#[async_trait]
impl HubConnector for FakeConnector {
    async fn connect(
        &self,
        options: HubOptions,
        events: mpsc::Sender<HubEvent>,
    ) -> Result<Box<dyn HubHandle>, HubError> {
        {
            let mut failures = self.setup_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(HubError::Setup("builder rejected url".into()));
            }
        }
        self.opened.lock().unwrap().push(options);
        let close_now = {
            let mut closes = self.early_closes.lock().unwrap();
            let close_now = *closes > 0;
            if close_now {
                *closes -= 1;
            }
            close_now
        };
        if close_now {
            events
                .send(HubEvent::Closed(Some("auth rejected".into())))
                .await
                .expect("service queue closed");
        }
        *self.events.lock().unwrap() = Some(events);
        Ok(Box::new(FakeHandle {
            stopped: Arc::clone(&self.stopped),
        }))
    }
}

struct FakeHandle {
    stopped: Arc<AtomicUsize>,
}

#[async_trait]
impl HubHandle for FakeHandle {
    async fn stop(&mut self) -> Result<(), HubError> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingLauncher {
    launched: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            launched: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }
}

#[async_trait]
impl NavigationLauncher for RecordingLauncher {
    async fn launch(&self, address: &str) -> Result<(), LaunchError> {
        self.launched.lock().unwrap().push(address.to_string());
        if self.fail {
            return Err(LaunchError::Unavailable("no maps app".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub lines: Mutex<Vec<String>>,
    pub lost_alerts: AtomicUsize,
    pub dispatches: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn persistent(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }

    fn connection_lost(&self) {
        self.lost_alerts.fetch_add(1, Ordering::SeqCst);
    }

    fn dispatch(&self, address: &str) {
        self.dispatches.lock().unwrap().push(address.to_string());
    }
}

pub struct Harness {
    pub handle: ServiceHandle,
    pub status: broadcast::Receiver<StatusUpdate>,
    pub negotiator: Arc<ScriptedNegotiator>,
    pub connector: Arc<FakeConnector>,
    pub launcher: Arc<RecordingLauncher>,
    pub notifier: Arc<RecordingNotifier>,
    pub task: tokio::task::JoinHandle<()>,
}

pub struct HarnessOptions {
    /// Stored in prefs before the service starts; `None` leaves it unset.
    pub officer: Option<&'static str>,
    pub negotiation_failures: u32,
    pub connector: Arc<FakeConnector>,
    pub launcher: Arc<RecordingLauncher>,
    pub config: ServiceConfig,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            officer: Some("A1"),
            negotiation_failures: 0,
            connector: FakeConnector::new(),
            launcher: RecordingLauncher::new(),
            config: ServiceConfig::default(),
        }
    }
}

pub fn spawn_service(dir: &Path, options: HarnessOptions) -> Harness {
    let paths = StoragePaths::in_dir(dir);
    if let Some(officer) = options.officer {
        Preferences::new(&paths.prefs)
            .set_officer_id(officer)
            .expect("store officer");
    }
    let negotiator = ScriptedNegotiator::failing(options.negotiation_failures);
    let notifier = Arc::new(RecordingNotifier::default());
    let (service, handle) = DispatchService::new(
        options.config,
        paths,
        Collaborators {
            negotiator: negotiator.clone(),
            connector: options.connector.clone(),
            launcher: options.launcher.clone(),
            notifier: notifier.clone(),
        },
    );
    let status = handle.subscribe_status();
    let task = tokio::spawn(service.run());
    Harness {
        handle,
        status,
        negotiator,
        connector: options.connector,
        launcher: options.launcher,
        notifier,
        task,
    }
}

pub async fn next_update(rx: &mut broadcast::Receiver<StatusUpdate>) -> StatusUpdate {
    tokio::time::timeout(Duration::from_secs(600), rx.recv())
        .await
        .expect("timed out waiting for a status update")
        .expect("status channel closed")
}

/// Collects updates up to and including the first one with `code`.
pub async fn updates_until(
    rx: &mut broadcast::Receiver<StatusUpdate>,
    code: StatusCode,
) -> Vec<StatusUpdate> {
    let mut seen = Vec::new();
    loop {
        let update = next_update(rx).await;
        let done = update.code == code;
        seen.push(update);
        if done {
            return seen;
        }
    }
}
