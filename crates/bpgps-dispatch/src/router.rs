use tracing::{debug, warn};

use crate::address::format_address;
use crate::config::ServiceConfig;
use crate::history::{HistoryEntry, HistoryLog};
use crate::hub::DispatchMessage;
use crate::identity::{normalize, OfficerId};

pub const DEBOUNCE_MS: i64 = 3_000;

/// Suppresses the same address arriving again within the window.
#[derive(Clone, Debug)]
pub struct Debouncer {
    window_ms: i64,
    last_address: Option<String>,
    last_address_at_millis: i64,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_MS)
    }
}

impl Debouncer {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            last_address: None,
            last_address_at_millis: 0,
        }
    }

    pub fn should_accept(&mut self, address: &str, now_millis: i64) -> bool {
        let same = self
            .last_address
            .as_deref()
            .is_some_and(|last| last.to_lowercase() == address.to_lowercase());
        let too_soon = now_millis - self.last_address_at_millis < self.window_ms;
        if same && too_soon {
            return false;
        }
        self.last_address = Some(address.to_string());
        self.last_address_at_millis = now_millis;
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Routed {
    pub entry: HistoryEntry,
    /// False when the history write failed; the dispatch is still acted on.
    pub recorded: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Blank address; nothing happened.
    Ignored,
    Debounced { address: String },
    Navigate(Routed),
    OtherOfficer(Routed),
}

pub struct DispatchRouter {
    debouncer: Debouncer,
    history: HistoryLog,
    default_city_state: String,
    navigate_when_unassigned: bool,
}

impl DispatchRouter {
    pub fn new(config: &ServiceConfig, history: HistoryLog) -> Self {
        Self {
            debouncer: Debouncer::new(config.debounce_ms as i64),
            history,
            default_city_state: config.default_city_state.clone(),
            navigate_when_unassigned: config.navigate_when_unassigned,
        }
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn route(&mut self, message: &DispatchMessage, officer: &OfficerId, now_millis: i64) -> Decision {
        if message.address.trim().is_empty() {
            return Decision::Ignored;
        }
        let address = format_address(&message.address, &self.default_city_state);
        if !self.debouncer.should_accept(&address, now_millis) {
            debug!("debounced repeat dispatch for {address}");
            return Decision::Debounced { address };
        }

        let source = normalize(message.police_id.as_deref());
        let is_mine = officer.matches(&source)
            || (self.navigate_when_unassigned && officer.is_unset());

        let entry = HistoryEntry::new(address, source, now_millis);
        let recorded = match self.history.append(entry.clone()) {
            Ok(()) => true,
            Err(err) => {
                warn!("History save failed: {err}");
                false
            }
        };

        let routed = Routed { entry, recorded };
        if is_mine {
            Decision::Navigate(routed)
        } else {
            Decision::OtherOfficer(routed)
        }
    }
}
