use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, warn};

use super::{PeerDirectory, PeerError, PeerLookup};
use crate::config::{ConfigResult, ConfigurationError, PeerConfig};

/// HTTP client issuing `GET {base_url}/{id}` against the peer
///
/// Each request runs under an abortable timeout covering both the response
/// head and the body.
#[derive(Clone)]
pub struct HttpPeerClient {
    client: Client,
    base_url: Url,
    name: String,
    timeout: Duration,
}

impl fmt::Debug for HttpPeerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPeerClient")
            .field("name", &self.name)
            .field("base_url", &self.base_url.as_str())
            .field("timeout_ms", &self.timeout.as_millis())
            .finish()
    }
}

impl HttpPeerClient {
    pub fn new(config: &PeerConfig) -> ConfigResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ConfigurationError::invalid_value("peer.base_url", &config.base_url, e.to_string())
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigurationError::invalid_value(
                "peer.base_url",
                &config.base_url,
                "must be an absolute http(s) URL",
            ));
        }

        let client = Client::builder()
            .user_agent(concat!("orders-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ConfigurationError::invalid_value("peer", &config.name, format!("HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url,
            name: config.name.clone(),
            timeout: config.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `{base_url}/{id}` with the id percent-encoded as one path segment
    fn entity_url(&self, entity_id: &str) -> Result<Url, PeerError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PeerError::InvalidResponse {
                message: format!("base URL {} cannot take path segments", self.base_url),
            })?
            .pop_if_empty()
            .push(entity_id);
        Ok(url)
    }

    fn classify(status: StatusCode) -> Option<Result<PeerLookup, PeerError>> {
        if status.is_success() {
            return None;
        }
        let result = match status {
            StatusCode::NOT_FOUND => Ok(PeerLookup::NotFound),
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
                Err(PeerError::Unavailable {
                    status: status.as_u16(),
                })
            }
            s if s.is_client_error() => Ok(PeerLookup::Rejected { status: s.as_u16() }),
            s if s.is_server_error() => Err(PeerError::Unavailable { status: s.as_u16() }),
            s => Err(PeerError::InvalidResponse {
                message: format!("unexpected status {s}"),
            }),
        };
        Some(result)
    }

    async fn fetch(&self, url: Url) -> Result<PeerLookup, PeerError> {
        let response = self.client.get(url).send().await.map_err(|e| PeerError::Network {
            message: e.to_string(),
        })?;

        let status = response.status();
        if let Some(result) = Self::classify(status) {
            return result;
        }

        let body = response.bytes().await.map_err(|e| PeerError::Network {
            message: format!("reading body: {e}"),
        })?;
        // A 2xx confirms existence even when the body isn't JSON
        let representation = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        Ok(PeerLookup::Found(representation))
    }
}

#[async_trait]
impl PeerDirectory for HttpPeerClient {
    async fn lookup(&self, entity_id: &str) -> Result<PeerLookup, PeerError> {
        let url = self.entity_url(entity_id)?;
        debug!(peer = %self.name, url = %url, "Peer lookup");

        let result = match tokio::time::timeout(self.timeout, self.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(PeerError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };

        match &result {
            Ok(lookup) => debug!(peer = %self.name, entity_id = %entity_id, found = lookup.is_found(), "Peer answered"),
            Err(err) => warn!(peer = %self.name, entity_id = %entity_id, error = %err, "Peer lookup failed"),
        }
        result
    }

    fn peer_name(&self) -> &str {
        &self.name
    }
}
