//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http::{ACCOUNTS_HOST, API_HOST, HTTPS_PORT};

/// Settings for a [`SpotifyClient`](crate::SpotifyClient).
///
/// Every field has a default, so a partial table deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Web API host.
    pub api_host: String,

    /// Accounts host serving the token endpoint.
    pub accounts_host: String,

    pub port: u16,

    /// Socket timeout for every call.
    pub timeout_ms: u64,

    /// Document capacity for currently-playing responses.
    pub playback_capacity: usize,

    /// Document capacity for audio-feature responses.
    pub audio_features_capacity: usize,

    /// Document capacity for device-list responses.
    pub devices_capacity: usize,

    /// Refresh the access token before calls once it is due.
    pub auto_token_refresh: bool,

    /// Join a seek's device id with `?` instead of `&`.
    pub legacy_seek_query: bool,

    /// Default market (ISO 3166-1 alpha-2) for track relinking.
    pub market: Option<String>,
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_host: API_HOST.to_string(),
            accounts_host: ACCOUNTS_HOST.to_string(),
            port: HTTPS_PORT,
            timeout_ms: 4000,
            playback_capacity: 4000,
            audio_features_capacity: 1000,
            devices_capacity: 3000,
            auto_token_refresh: true,
            legacy_seek_query: false,
            market: None,
        }
    }
}
