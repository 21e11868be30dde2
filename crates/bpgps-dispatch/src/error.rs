use thiserror::Error;

#[derive(Debug, Error)]
pub enum NegotiateError {
    #[error("negotiate request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("negotiate returned HTTP {0}")]
    Status(u16),
    #[error("negotiate response malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("negotiate response has an empty url")]
    EmptyUrl,
}

#[derive(Debug, Error)]
pub enum HubError {
    /// The connection could not be constructed.
    #[error("hub setup failed: {0}")]
    Setup(String),
    /// The connection was built but did not complete its handshake.
    #[error("hub start failed: {0}")]
    Start(String),
    #[error("hub stop failed: {0}")]
    Stop(String),
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("navigation command is empty")]
    NoCommand,
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("navigation launcher unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("officer id must not be blank")]
    InvalidOfficerId,
    #[error("failed to persist preferences: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
#[error("dispatch service is not running")]
pub struct ServiceStopped;
