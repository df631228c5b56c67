//! Blocking HTTP client for the zone provider
//!
//! The dashboard does not talk to players directly. A companion HTTP API
//! (node-sonos-http-api, "jishi") exposes the household as JSON:
//!
//! - `GET /zones` returns the flat list of zones the synchronizer consumes
//! - `GET /<room>/<action>` applies a command such as `play` or `volume/30`
//! - `GET /<room>/state` returns a single player's state
//!
//! [`JishiClient`] implements all of the [`traits`] used by the rest of the
//! workspace.

mod action;
mod error;
pub mod traits;
mod zone;

pub use action::{Action, CommandResponse};
pub use error::ClientError;
pub use traits::{CommandSink, HealthProbe, NoRecovery, ProviderRecovery, SnapshotSource};
pub use zone::{MemberDescriptor, StateBlock, TrackDescriptor, ZoneDescriptor};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use url::Url;

/// Default connect timeout for provider requests
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A minimal JSON-over-HTTP client for the provider
///
/// Clones share the same agent and the same base URL, so repointing one
/// clone (after the companion comes up on its own port) repoints them all.
#[derive(Debug, Clone)]
pub struct JishiClient {
    agent: ureq::Agent,
    base_url: Arc<RwLock<Url>>,
}

impl JishiClient {
    /// Create a client for the provider at `base_url`
    ///
    /// `timeout` bounds the whole request after the connection is made.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let url = Url::parse(base_url)?;
        Ok(Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(DEFAULT_CONNECT_TIMEOUT.min(timeout))
                .timeout_read(timeout)
                .build(),
            base_url: Arc::new(RwLock::new(url)),
        })
    }

    /// Current provider base URL
    pub fn base_url(&self) -> String {
        self.base_url.read().as_str().trim_end_matches('/').to_string()
    }

    /// Point this client (and every clone of it) at a different provider
    pub fn set_base_url(&self, base_url: &str) -> Result<(), ClientError> {
        let url = Url::parse(base_url)?;
        *self.base_url.write() = url;
        Ok(())
    }

    /// Fetch all zones
    ///
    /// Entries that are not zone-shaped are kept as empty descriptors so the
    /// caller can count and drop them individually.
    pub fn zones(&self) -> Result<Vec<ZoneDescriptor>, ClientError> {
        let url = self.endpoint(&["zones"])?;
        let response = self.get(&url)?;
        let values: Vec<serde_json::Value> = response
            .into_json()
            .map_err(|e| ClientError::Parse(e.to_string()))?;

        Ok(values.into_iter().map(ZoneDescriptor::from_value_lossy).collect())
    }

    /// Fetch the state of a single player by room name
    pub fn device_state(&self, room: &str) -> Result<StateBlock, ClientError> {
        let url = self.endpoint(&[room, "state"])?;
        self.get(&url)?
            .into_json()
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    /// Send a command to a player by room name
    pub fn send(&self, room: &str, action: &Action) -> Result<CommandResponse, ClientError> {
        let segments = action.path_segments();
        let mut path: Vec<&str> = vec![room];
        path.extend(segments.iter().map(String::as_str));
        let url = self.endpoint(&path)?;

        tracing::info!("Executing {} command on {} via provider: {}", action.name(), room, url);

        let response = self.get(&url)?;
        let status = response.status();
        let body = response
            .into_string()
            .map_err(|e| ClientError::Parse(e.to_string()))?;

        tracing::debug!("Provider response for {} on {}: status {}, body: {}", action.name(), room, status, body);

        Ok(CommandResponse { status, body })
    }

    /// Returns true when `/zones` answers with 200
    pub fn probe(&self) -> bool {
        match self.endpoint(&["zones"]) {
            Ok(url) => matches!(self.agent.get(url.as_str()).call(), Ok(r) if r.status() == 200),
            Err(_) => false,
        }
    }

    fn get(&self, url: &Url) -> Result<ureq::Response, ClientError> {
        let response = self.agent.get(url.as_str()).call()?;

        if response.status() != 200 {
            let code = response.status();
            return Err(ClientError::Status {
                code,
                body: response.into_string().unwrap_or_default(),
            });
        }

        Ok(response)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.read().clone();
        let base = url.to_string();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(format!("{} cannot be a base", base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl SnapshotSource for JishiClient {
    fn zones(&self) -> Result<Vec<ZoneDescriptor>, ClientError> {
        JishiClient::zones(self)
    }
}

impl CommandSink for JishiClient {
    fn send(&self, target: &str, action: &Action) -> Result<CommandResponse, ClientError> {
        JishiClient::send(self, target, action)
    }

    fn device_state(&self, target: &str) -> Result<StateBlock, ClientError> {
        JishiClient::device_state(self, target)
    }
}

impl HealthProbe for JishiClient {
    fn probe(&self) -> bool {
        JishiClient::probe(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = JishiClient::new("http://localhost:5005", Duration::from_secs(30)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:5005");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = JishiClient::new("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(ClientError::InvalidUrl(_))));
    }

    #[test]
    fn test_endpoint_encodes_room_names() {
        let client = JishiClient::new("http://localhost:5005", Duration::from_secs(1)).unwrap();
        let url = client.endpoint(&["Living Room", "volume", "20"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5005/Living%20Room/volume/20");
    }

    #[test]
    fn test_endpoint_with_trailing_slash_base() {
        let client = JishiClient::new("http://localhost:5005/", Duration::from_secs(1)).unwrap();
        let url = client.endpoint(&["zones"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5005/zones");
    }

    #[test]
    fn test_clones_share_base_url() {
        let client = JishiClient::new("http://localhost:5005", Duration::from_secs(1)).unwrap();
        let clone = client.clone();
        clone.set_base_url("http://127.0.0.1:5006").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:5006");
    }

    #[test]
    fn test_no_recovery_refuses() {
        let err = NoRecovery.recover().unwrap_err();
        assert!(matches!(err, ClientError::Recovery(_)));
    }
}
