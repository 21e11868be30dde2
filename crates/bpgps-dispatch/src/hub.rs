//! Boundary to the real-time hub connection.
//!
//! The transport itself lives outside this crate. A [`HubConnector`] builds a
//! connection from [`HubOptions`] and pushes typed [`HubEvent`]s onto the
//! service's queue; the service drains that queue on a single task.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::ServiceConfig;
use crate::error::HubError;
use crate::negotiate::Negotiation;

pub const DISPATCH_METHODS: [&str; 2] = ["newAddress", "ReceiveDispatch"];
pub const NOTICE_METHODS: [&str; 4] = ["Connected", "Disconnected", "Ping", "Heartbeat"];

/// Server-pushed dispatch payload. A missing `address` decodes as empty and is
/// dropped later by the router.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct DispatchMessage {
    #[serde(default)]
    pub address: String,
    #[serde(rename = "policeId", default)]
    pub police_id: Option<String>,
}

impl DispatchMessage {
    pub fn new(address: impl Into<String>, police_id: Option<&str>) -> Self {
        Self {
            address: address.into(),
            police_id: police_id.map(str::to_string),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HubEvent {
    Dispatch(DispatchMessage),
    /// A bare server notification (`Ping`, `Heartbeat`, ...).
    Notice(String),
    /// The connection closed; carries the close reason when one was given.
    Closed(Option<String>),
}

impl HubEvent {
    /// Maps a server-to-client invocation onto a typed event. Unsubscribed
    /// methods and undecodable dispatch payloads yield `None`.
    pub fn from_invocation(target: &str, arguments: &[Value]) -> Option<Self> {
        if DISPATCH_METHODS
            .iter()
            .any(|method| method.eq_ignore_ascii_case(target))
        {
            let payload = arguments.first()?;
            return match DispatchMessage::deserialize(payload) {
                Ok(message) => Some(HubEvent::Dispatch(message)),
                Err(err) => {
                    debug!("dropping malformed {target} payload: {err}");
                    None
                }
            };
        }
        NOTICE_METHODS
            .iter()
            .find(|method| method.eq_ignore_ascii_case(target))
            .map(|method| HubEvent::Notice((*method).to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    WebSockets,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubOptions {
    pub url: String,
    pub access_token: String,
    /// The negotiate call already happened; the client must not repeat it.
    pub skip_negotiation: bool,
    pub transport: Transport,
    pub handshake_timeout: Duration,
    pub server_timeout: Duration,
    pub dispatch_methods: Vec<String>,
    pub notice_methods: Vec<String>,
}

impl HubOptions {
    pub fn from_negotiation(negotiation: &Negotiation, config: &ServiceConfig) -> Self {
        Self {
            url: negotiation.url.clone(),
            access_token: negotiation.access_token.clone(),
            skip_negotiation: true,
            transport: Transport::WebSockets,
            handshake_timeout: config.handshake_timeout(),
            server_timeout: config.server_timeout(),
            dispatch_methods: DISPATCH_METHODS.iter().map(|m| m.to_string()).collect(),
            notice_methods: NOTICE_METHODS.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// `Authorization` header value, derived from the token; none when empty.
    pub fn authorization(&self) -> Option<String> {
        if self.access_token.is_empty() {
            None
        } else {
            Some(format!("Bearer {}", self.access_token))
        }
    }
}

#[async_trait]
pub trait HubConnector: Send + Sync {
    /// Builds and starts a connection. Events, including the final
    /// [`HubEvent::Closed`], go to `events` until the handle is stopped.
    async fn connect(
        &self,
        options: HubOptions,
        events: mpsc::Sender<HubEvent>,
    ) -> Result<Box<dyn HubHandle>, HubError>;
}

#[async_trait]
pub trait HubHandle: Send {
    async fn stop(&mut self) -> Result<(), HubError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn negotiation(token: &str) -> Negotiation {
        Negotiation {
            url: "wss://hub.example/client/?hub=dispatch".into(),
            access_token: token.into(),
        }
    }

    #[test]
    fn options_follow_the_connection_contract() {
        let options = HubOptions::from_negotiation(&negotiation("tok"), &ServiceConfig::default());
        assert!(options.skip_negotiation);
        assert_eq!(options.transport, Transport::WebSockets);
        assert_eq!(options.handshake_timeout, Duration::from_millis(60_000));
        assert_eq!(options.server_timeout, Duration::from_millis(300_000));
        assert_eq!(options.authorization().as_deref(), Some("Bearer tok"));
        assert_eq!(options.dispatch_methods, ["newAddress", "ReceiveDispatch"]);
    }

    #[test]
    fn empty_token_sends_no_authorization() {
        let options = HubOptions::from_negotiation(&negotiation(""), &ServiceConfig::default());
        assert_eq!(options.authorization(), None);
    }

    #[test]
    fn authorization_tracks_the_token() {
        let mut options =
            HubOptions::from_negotiation(&negotiation("first"), &ServiceConfig::default());
        options.access_token = "second".into();
        assert_eq!(options.authorization().as_deref(), Some("Bearer second"));
    }

    #[test]
    fn dispatch_methods_decode_payloads() {
        let event = HubEvent::from_invocation(
            "ReceiveDispatch",
            &[json!({"address": "4 Pine St", "policeId": "a1"})],
        );
        assert_eq!(
            event,
            Some(HubEvent::Dispatch(DispatchMessage::new("4 Pine St", Some("a1"))))
        );

        let missing = HubEvent::from_invocation("newaddress", &[json!({"policeId": "a1"})]);
        assert_eq!(
            missing,
            Some(HubEvent::Dispatch(DispatchMessage::new("", Some("a1"))))
        );
    }

    #[test]
    fn malformed_or_unknown_invocations_are_dropped() {
        assert_eq!(HubEvent::from_invocation("newAddress", &[]), None);
        assert_eq!(HubEvent::from_invocation("newAddress", &[json!(42)]), None);
        assert_eq!(HubEvent::from_invocation("SomethingElse", &[]), None);
    }

    #[test]
    fn notices_keep_their_canonical_name() {
        assert_eq!(
            HubEvent::from_invocation("heartbeat", &[]),
            Some(HubEvent::Notice("Heartbeat".into()))
        );
    }
}
