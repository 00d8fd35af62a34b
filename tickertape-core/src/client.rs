//! The Web API client a polling loop drives.
//!
//! [`SpotifyClient`] owns one [`Transport`], a [`TokenManager`] and a
//! [`ClientConfig`]. Each call:
//!
//! 1. refreshes the access token if it is due (when `auto_token_refresh` is on),
//! 2. sends one request,
//! 3. streams the body through an allow-list filter,
//! 4. closes the connection.
//!
//! Polls return a freshly built snapshot and commands return `bool`; neither
//! ever fails outward. The `try_*` variants return the [`ApiError`] instead.

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::filter::{self, Filter, FilteredDocument};
use crate::http::{self, JSON_CONTENT_TYPE, Request};
use crate::player::{PlayerCommand, RepeatMode};
use crate::response;
use crate::snapshot::{
    AUDIO_FEATURE_FIELDS, AudioFeatureSnapshot, DEVICE_FIELDS, DeviceSnapshot, PLAYBACK_FIELDS,
    PlaybackSnapshot,
};
use crate::token::Credentials;
use crate::token_manager::TokenManager;
use crate::transport::Transport;

pub const CURRENTLY_PLAYING_PATH: &str = "/v1/me/player/currently-playing";
pub const AUDIO_FEATURES_PATH: &str = "/v1/audio-features/";
pub const DEVICES_PATH: &str = "/v1/me/player/devices";

/// Result of a GET that reached the body.
enum Fetched {
    Document(FilteredDocument, u16),
    NoContent(u16),
}

/// Spotify Web API client.
pub struct SpotifyClient<T: Transport, C: Clock = SystemClock> {
    transport: T,
    tokens: TokenManager<C>,
    config: ClientConfig,
}

impl<T: Transport> SpotifyClient<T> {
    /// Create a client using the system clock.
    pub fn new(transport: T, credentials: Credentials, config: ClientConfig) -> Self {
        Self::with_clock(transport, credentials, config, SystemClock::new())
    }
}

impl<T: Transport, C: Clock> SpotifyClient<T, C> {
    /// Create a client reading time from `clock`.
    pub fn with_clock(transport: T, credentials: Credentials, config: ClientConfig, clock: C) -> Self {
        let tokens = TokenManager::with_clock(credentials, clock);
        Self::with_token_manager(transport, tokens, config)
    }

    /// Create a client around an existing token manager.
    ///
    /// The manager is pointed at the configured accounts host and timeout.
    pub fn with_token_manager(transport: T, tokens: TokenManager<C>, config: ClientConfig) -> Self {
        let tokens = tokens
            .with_endpoint(config.accounts_host.as_str(), config.port)
            .with_timeout(config.timeout());
        Self {
            transport,
            tokens,
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenManager<C> {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut TokenManager<C> {
        &mut self.tokens
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Force a refresh-token grant.
    pub fn refresh_access_token(&mut self) -> bool {
        self.transport.stop();
        self.tokens.refresh(&mut self.transport)
    }

    /// Refresh the access token if its cached lifetime has passed.
    pub fn ensure_valid_token(&mut self) -> bool {
        self.tokens.ensure_valid(&mut self.transport)
    }

    /// Exchange an authorization code; returns the refresh token held
    /// afterwards, which is the previous one if the exchange failed.
    pub fn exchange_authorization_code(&mut self, code: &str, redirect_url: &str) -> String {
        self.transport.stop();
        self.tokens
            .exchange_authorization_code(&mut self.transport, code, redirect_url)
            .to_string()
    }

    /// What is playing now.
    ///
    /// `market` overrides the configured market.
    pub fn currently_playing(&mut self, market: Option<&str>) -> PlaybackSnapshot {
        self.try_currently_playing(market).unwrap_or_else(|e| {
            tracing::warn!("Currently playing poll failed: {}", e);
            PlaybackSnapshot::failed(e.status_code())
        })
    }

    pub fn try_currently_playing(&mut self, market: Option<&str>) -> Result<PlaybackSnapshot, ApiError> {
        let path = self.with_market(CURRENTLY_PLAYING_PATH.to_string(), market);
        let capacity = self.config.playback_capacity;

        match self.fetch(&path, &PLAYBACK_FIELDS, capacity)? {
            Fetched::Document(document, status) => Ok(PlaybackSnapshot::from_document(&document, status)),
            Fetched::NoContent(status) => Ok(PlaybackSnapshot::no_session(status)),
        }
    }

    /// Audio features of `track_id`.
    pub fn audio_features(&mut self, track_id: &str, market: Option<&str>) -> AudioFeatureSnapshot {
        self.try_audio_features(track_id, market).unwrap_or_else(|e| {
            tracing::warn!("Audio features request failed: {}", e);
            AudioFeatureSnapshot::failed(e.status_code())
        })
    }

    pub fn try_audio_features(
        &mut self,
        track_id: &str,
        market: Option<&str>,
    ) -> Result<AudioFeatureSnapshot, ApiError> {
        let path = format!("{}{}", AUDIO_FEATURES_PATH, encode(track_id));
        let path = self.with_market(path, market);
        let capacity = self.config.audio_features_capacity;

        match self.fetch(&path, &AUDIO_FEATURE_FIELDS, capacity)? {
            Fetched::Document(document, status) => {
                Ok(AudioFeatureSnapshot::from_document(&document, status))
            }
            Fetched::NoContent(status) => Ok(AudioFeatureSnapshot::no_content(status)),
        }
    }

    /// The user's playback devices.
    pub fn devices(&mut self) -> DeviceSnapshot {
        self.try_devices().unwrap_or_else(|e| {
            tracing::warn!("Devices request failed: {}", e);
            DeviceSnapshot::failed(e.status_code())
        })
    }

    pub fn try_devices(&mut self) -> Result<DeviceSnapshot, ApiError> {
        let capacity = self.config.devices_capacity;

        match self.fetch(DEVICES_PATH, &DEVICE_FIELDS, capacity)? {
            Fetched::Document(document, status) => Ok(DeviceSnapshot::from_document(&document, status)),
            Fetched::NoContent(status) => Ok(DeviceSnapshot {
                status_code: Some(status),
                ..DeviceSnapshot::default()
            }),
        }
    }

    pub fn play(&mut self, device_id: &str) -> bool {
        self.dispatch(&PlayerCommand::Play { body: None }, device_id)
    }

    /// Play with a JSON body, e.g. `{"context_uri":"spotify:album:..."}`.
    pub fn play_with_body(&mut self, body: &str, device_id: &str) -> bool {
        let command = PlayerCommand::Play {
            body: Some(body.to_string()),
        };
        self.dispatch(&command, device_id)
    }

    pub fn pause(&mut self, device_id: &str) -> bool {
        self.dispatch(&PlayerCommand::Pause, device_id)
    }

    pub fn set_volume(&mut self, percent: u8, device_id: &str) -> bool {
        self.dispatch(&PlayerCommand::SetVolume { percent }, device_id)
    }

    pub fn next_track(&mut self, device_id: &str) -> bool {
        self.dispatch(&PlayerCommand::Next, device_id)
    }

    pub fn previous_track(&mut self, device_id: &str) -> bool {
        self.dispatch(&PlayerCommand::Previous, device_id)
    }

    pub fn seek(&mut self, position_ms: u32, device_id: &str) -> bool {
        self.dispatch(&PlayerCommand::Seek { position_ms }, device_id)
    }

    /// Move playback to `device_id`, starting it if `play` is set.
    pub fn transfer_playback(&mut self, device_id: &str, play: bool) -> bool {
        let command = PlayerCommand::Transfer {
            device_id: device_id.to_string(),
            play,
        };
        self.dispatch(&command, "")
    }

    pub fn set_shuffle(&mut self, enabled: bool, device_id: &str) -> bool {
        self.dispatch(&PlayerCommand::Shuffle { enabled }, device_id)
    }

    pub fn set_repeat(&mut self, mode: RepeatMode, device_id: &str) -> bool {
        self.dispatch(&PlayerCommand::Repeat { mode }, device_id)
    }

    /// Send a player command; `true` only on HTTP 204.
    pub fn dispatch(&mut self, command: &PlayerCommand, device_id: &str) -> bool {
        match self.try_dispatch(command, device_id) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Player command {} failed: {}", command.name(), e);
                false
            }
        }
    }

    pub fn try_dispatch(&mut self, command: &PlayerCommand, device_id: &str) -> Result<(), ApiError> {
        self.refresh_if_enabled();

        let path = command.path(device_id, self.config.legacy_seek_query);
        let request = self
            .request(Request::new(command.method(), path))
            .body(command.body(), JSON_CONTENT_TYPE);

        let result = self.send_command(&request);
        self.transport.stop();
        result
    }

    fn send_command(&mut self, request: &Request) -> Result<(), ApiError> {
        let status = http::send(&mut self.transport, request, self.config.timeout())?;
        if status == 204 {
            return Ok(());
        }

        if status >= 400 && response::skip_headers(&mut self.transport, true) {
            response::log_error_body(&mut self.transport, request.path());
        }
        Err(ApiError::HttpError { status })
    }

    fn fetch(&mut self, path: &str, fields: &[&str], capacity: usize) -> Result<Fetched, ApiError> {
        self.refresh_if_enabled();

        let request = self.request(Request::get(path));
        let result = self.read_response(&request, fields, capacity);
        self.transport.stop();
        result
    }

    fn read_response(
        &mut self,
        request: &Request,
        fields: &[&str],
        capacity: usize,
    ) -> Result<Fetched, ApiError> {
        let status = http::send(&mut self.transport, request, self.config.timeout())?;

        if !response::skip_headers(&mut self.transport, true) {
            return Err(ApiError::ProtocolFailure {
                status: Some(status),
                message: "end of headers not found".to_string(),
            });
        }

        match status {
            200 => {
                let filter = Filter::from_paths(fields);
                filter::decode(&mut self.transport, &filter, capacity)
                    .map(|document| Fetched::Document(document, status))
                    .map_err(|source| ApiError::DecodeFailure { status, source })
            }
            204 => Ok(Fetched::NoContent(status)),
            _ => {
                response::log_error_body(&mut self.transport, request.path());
                Err(ApiError::HttpError { status })
            }
        }
    }

    fn refresh_if_enabled(&mut self) {
        if self.config.auto_token_refresh {
            self.tokens.ensure_valid(&mut self.transport);
        }
    }

    fn request(&self, request: Request) -> Request {
        let request = request.host(self.config.api_host.as_str(), self.config.port);
        match self.tokens.authorization_header() {
            Some(header) => request.authorization(header),
            None => request,
        }
    }

    fn with_market(&self, mut path: String, market: Option<&str>) -> String {
        let market = market.or(self.config.market.as_deref()).unwrap_or_default();
        if !market.is_empty() {
            path.push_str("?market=");
            path.push_str(&encode(market));
        }
        path
    }
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
