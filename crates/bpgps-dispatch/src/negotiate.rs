use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ServiceConfig;
use crate::error::NegotiateError;

/// Connection parameters handed out by the negotiate endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Negotiation {
    pub url: String,
    #[serde(rename = "accessToken", default)]
    pub access_token: String,
}

#[async_trait]
pub trait Negotiator: Send + Sync {
    async fn negotiate(&self) -> Result<Negotiation, NegotiateError>;
}

pub struct HttpNegotiator {
    client: Client,
    url: String,
}

impl HttpNegotiator {
    pub fn new(config: &ServiceConfig) -> Result<Self, NegotiateError> {
        let client = Client::builder()
            .connect_timeout(config.negotiate_timeout())
            .timeout(config.negotiate_timeout())
            .build()?;
        Ok(Self::with_client(client, config.negotiate_url.clone()))
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Negotiator for HttpNegotiator {
    async fn negotiate(&self) -> Result<Negotiation, NegotiateError> {
        debug!("POST {}", self.url);
        let resp = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body("")
            .send()
            .await?;
        let status = resp.status();
        if status != StatusCode::OK {
            warn!("negotiate returned {status}");
            return Err(NegotiateError::Status(status.as_u16()));
        }
        let body = resp.text().await?;
        parse_negotiation(&body)
    }
}

pub(crate) fn parse_negotiation(body: &str) -> Result<Negotiation, NegotiateError> {
    let negotiation: Negotiation = serde_json::from_str(body)?;
    if negotiation.url.trim().is_empty() {
        return Err(NegotiateError::EmptyUrl);
    }
    Ok(negotiation)
}
