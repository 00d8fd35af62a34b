//! Access token lifecycle against the accounts token endpoint.
//!
//! This module provides [`TokenManager`], which owns the [`Credentials`] and
//! the current [`AccessToken`] and keeps the latter fresh on a time heuristic.
//!
//! # Features
//!
//! - Initial authorization-code exchange
//! - Refresh-token grant, with the expiry derived from `expires_in`
//! - `ensure_valid` gate that refreshes only once the cached expiry passes
//! - Static bearer tokens that never refresh
//!
//! There is no retry or backoff. A failed refresh keeps the old access token
//! in place and the next `ensure_valid` call tries again.
//!
//! # Example
//!
//! ```rust
//! use tickertape_core::{Credentials, ManualClock, MemoryTransport, TokenManager};
//! use tickertape_core::transport::http_response;
//!
//! let clock = ManualClock::starting_at(0);
//! let mut manager = TokenManager::with_clock(Credentials::new("id", "secret", "refresh"), clock);
//! let mut transport = MemoryTransport::new()
//!     .with_response(http_response(200, r#"{"access_token":"AAA","expires_in":3600}"#));
//!
//! assert!(manager.ensure_valid(&mut transport));
//! assert_eq!(manager.expires_at_ms(), Some(3_600_000 - 2000));
//! ```

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use crate::clock::{Clock, SystemClock};
use crate::filter::{self, DecodeError, Filter, FilteredDocument};
use crate::http::{self, ACCOUNTS_HOST, FORM_CONTENT_TYPE, HTTPS_PORT, Request, RequestError};
use crate::response;
use crate::token::{AccessToken, Credentials, Secret};
use crate::transport::Transport;

/// Path of the token endpoint on the accounts host.
pub const TOKEN_PATH: &str = "/api/token";

/// Document capacity for refresh-token grant responses.
pub const REFRESH_RESPONSE_CAPACITY: usize = 2048;

/// Document capacity for authorization-code grant responses.
pub const EXCHANGE_RESPONSE_CAPACITY: usize = 1000;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(4000);

const TOKEN_RESPONSE_FIELDS: [&str; 5] = [
    "access_token",
    "refresh_token",
    "expires_in",
    "token_type",
    "scope",
];

/// Error type for token endpoint calls.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The request could not be sent.
    #[error("token request failed: {0}")]
    Request(#[from] RequestError),

    /// The endpoint answered with something other than 200.
    #[error("token endpoint returned HTTP {status}")]
    Status { status: u16 },

    /// The response headers never ended.
    #[error("token response headers are incomplete")]
    MissingHeaders,

    /// The response body could not be decoded.
    #[error("token response could not be decoded: {0}")]
    Decode(#[from] DecodeError),

    /// The response decoded but carried no access token.
    #[error("token response has no access_token")]
    MissingAccessToken,
}

/// Where the access token stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No access token has been obtained yet.
    Unauthenticated,

    /// The access token is within its lifetime.
    Valid,

    /// The access token's cached lifetime has passed; the next
    /// `ensure_valid` will refresh it.
    Expiring,
}

/// Owns the credentials and access token.
pub struct TokenManager<C: Clock = SystemClock> {
    credentials: Credentials,
    access_token: Option<AccessToken>,
    clock: C,
    host: String,
    port: u16,
    timeout: Duration,
}

impl TokenManager {
    /// Create a manager using the system clock.
    pub fn new(credentials: Credentials) -> Self {
        Self::with_clock(credentials, SystemClock::new())
    }
}

impl<C: Clock> TokenManager<C> {
    /// Create a manager reading time from `clock`.
    pub fn with_clock(credentials: Credentials, clock: C) -> Self {
        Self {
            credentials,
            access_token: None,
            clock,
            host: ACCOUNTS_HOST.to_string(),
            port: HTTPS_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Point the manager at a different accounts host.
    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the socket timeout for token requests.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a caller-provided bearer token that is never refreshed.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(AccessToken::non_expiring(token));
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn access_token(&self) -> Option<&AccessToken> {
        self.access_token.as_ref()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Replace the refresh token, e.g. with one loaded from disk.
    pub fn set_refresh_token(&mut self, refresh_token: impl Into<String>) {
        self.credentials.refresh_token = Secret::new(refresh_token);
    }

    pub fn state(&self) -> TokenState {
        match &self.access_token {
            None => TokenState::Unauthenticated,
            Some(token) if token.is_due(self.clock.now_ms()) => TokenState::Expiring,
            Some(_) => TokenState::Valid,
        }
    }

    /// Clock reading at which the current access token becomes due.
    pub fn expires_at_ms(&self) -> Option<u64> {
        self.access_token.as_ref().map(AccessToken::expires_at_ms)
    }

    /// `Authorization` header for API calls, if a token is held.
    pub fn authorization_header(&self) -> Option<String> {
        self.access_token.as_ref().map(AccessToken::bearer_header)
    }

    /// Refresh the access token if its cached lifetime has passed.
    ///
    /// The check is purely time based. While unauthenticated it always
    /// refreshes. Any open connection is closed first so the token request
    /// gets the connection slot.
    pub fn ensure_valid<T: Transport + ?Sized>(&mut self, transport: &mut T) -> bool {
        if self.state() == TokenState::Valid {
            return true;
        }

        tracing::info!("Refresh of the access token is due");
        transport.stop();
        self.refresh(transport)
    }

    /// Obtain a new access token with the refresh-token grant.
    ///
    /// On failure the previous access token is kept as is.
    pub fn refresh<T: Transport + ?Sized>(&mut self, transport: &mut T) -> bool {
        match self.try_refresh(transport) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to refresh access token: {}", e);
                false
            }
        }
    }

    /// Like [`refresh`](Self::refresh), returning the failure.
    pub fn try_refresh<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), TokenError> {
        let body = form_body(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", self.credentials.refresh_token.expose()),
            ("client_id", &self.credentials.client_id),
            ("client_secret", self.credentials.client_secret.expose()),
        ]);

        let document = self.request_token(transport, body, REFRESH_RESPONSE_CAPACITY)?;
        self.store_access_token(&document)
    }

    /// Exchange an authorization code for a refresh token.
    ///
    /// Always returns the refresh token the manager holds afterwards: the new
    /// one on success, the previous one unchanged on any failure. Failures
    /// are logged only.
    pub fn exchange_authorization_code<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        code: &str,
        redirect_url: &str,
    ) -> &str {
        if let Err(e) = self.try_exchange_authorization_code(transport, code, redirect_url) {
            tracing::error!("Failed to exchange authorization code: {}", e);
        }
        self.credentials.refresh_token.expose()
    }

    /// Like [`exchange_authorization_code`](Self::exchange_authorization_code),
    /// returning the failure.
    pub fn try_exchange_authorization_code<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        code: &str,
        redirect_url: &str,
    ) -> Result<(), TokenError> {
        let body = form_body(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_url),
            ("client_id", &self.credentials.client_id),
            ("client_secret", self.credentials.client_secret.expose()),
        ]);

        let document = self.request_token(transport, body, EXCHANGE_RESPONSE_CAPACITY)?;
        self.store_access_token(&document)?;

        let refresh_token = document.str_at("/refresh_token");
        if refresh_token.is_empty() {
            tracing::warn!("Code exchange response carried no refresh token, keeping the old one");
        } else {
            self.credentials.refresh_token = Secret::new(refresh_token);
        }
        Ok(())
    }

    fn request_token<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        body: String,
        capacity: usize,
    ) -> Result<FilteredDocument, TokenError> {
        let request = Request::post(TOKEN_PATH)
            .host(self.host.as_str(), self.port)
            .body(body, FORM_CONTENT_TYPE);

        let result = read_token_response(transport, &request, self.timeout, capacity);
        transport.stop();
        result
    }

    fn store_access_token(&mut self, document: &FilteredDocument) -> Result<(), TokenError> {
        let value = document.str_at("/access_token");
        if value.is_empty() {
            return Err(TokenError::MissingAccessToken);
        }

        let expires_in = u64::try_from(document.i64_at("/expires_in")).unwrap_or(0);
        let token = AccessToken::issued(value, self.clock.now_ms(), expires_in);

        match wall_clock_expiry(token.ttl_ms()) {
            Some(valid_until) => {
                tracing::info!("Access token refreshed, valid until {}", valid_until.to_rfc3339())
            }
            None => tracing::info!("Access token refreshed, valid for {} ms", token.ttl_ms()),
        }

        self.access_token = Some(token);
        Ok(())
    }
}

impl<C: Clock> std::fmt::Debug for TokenManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("credentials", &self.credentials)
            .field("access_token", &self.access_token)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

fn read_token_response<T: Transport + ?Sized>(
    transport: &mut T,
    request: &Request,
    timeout: Duration,
    capacity: usize,
) -> Result<FilteredDocument, TokenError> {
    let status = http::send(transport, request, timeout)?;

    if !response::skip_headers(transport, true) {
        return Err(TokenError::MissingHeaders);
    }

    if status != 200 {
        response::log_error_body(&mut *transport, "Token request");
        return Err(TokenError::Status { status });
    }

    let filter = Filter::from_paths(TOKEN_RESPONSE_FIELDS);
    Ok(filter::decode(&mut *transport, &filter, capacity)?)
}

/// Wall-clock time `ttl_ms` from now, if it is representable.
fn wall_clock_expiry(ttl_ms: u64) -> Option<DateTime<Utc>> {
    let ttl = TimeDelta::try_milliseconds(i64::try_from(ttl_ms).ok()?)?;
    Utc::now().checked_add_signed(ttl)
}

fn form_body(pairs: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::transport::{MemoryTransport, http_response};

    fn manager(clock: &ManualClock) -> TokenManager<ManualClock> {
        TokenManager::with_clock(Credentials::new("client", "s3cret", "old-refresh"), clock.clone())
    }

    #[test]
    fn test_form_body_is_url_encoded() {
        let body = form_body(&[("redirect_uri", "http://localhost/cb?x=1"), ("code", "a b")]);
        assert_eq!(body, "redirect_uri=http%3A%2F%2Flocalhost%2Fcb%3Fx%3D1&code=a+b");
    }

    #[test]
    fn test_refresh_request_format() {
        let clock = ManualClock::starting_at(0);
        let mut manager = manager(&clock);
        let mut transport = MemoryTransport::new()
            .with_response(http_response(200, r#"{"access_token":"AAA","expires_in":3600}"#));

        assert!(manager.refresh(&mut transport));

        let request = transport.last_request_text().unwrap();
        assert!(request.starts_with("POST /api/token HTTP/1.1\r\nHost: accounts.spotify.com\r\n"));
        assert!(request.contains("Content-Type: application/x-www-form-urlencoded\r\n"));
        assert!(request.contains(
            "grant_type=refresh_token&refresh_token=old-refresh&client_id=client&client_secret=s3cret"
        ));
        assert_eq!(transport.connections()[0], ("accounts.spotify.com".to_string(), 443));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_state_transitions() {
        let clock = ManualClock::starting_at(1_000);
        let mut manager = manager(&clock);
        assert_eq!(manager.state(), TokenState::Unauthenticated);

        let mut transport = MemoryTransport::new()
            .with_response(http_response(200, r#"{"access_token":"AAA","expires_in":10}"#));
        assert!(manager.ensure_valid(&mut transport));
        assert_eq!(manager.state(), TokenState::Valid);
        assert_eq!(manager.authorization_header().as_deref(), Some("Bearer AAA"));

        clock.advance(8_000);
        assert_eq!(manager.state(), TokenState::Expiring);
    }

    #[test]
    fn test_refresh_failure_keeps_old_token() {
        let clock = ManualClock::starting_at(0);
        let mut manager = manager(&clock);
        let mut transport = MemoryTransport::new()
            .with_response(http_response(200, r#"{"access_token":"AAA","expires_in":3600}"#))
            .with_response(http_response(
                400,
                r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#,
            ));

        assert!(manager.refresh(&mut transport));
        assert!(!manager.refresh(&mut transport));
        assert_eq!(manager.authorization_header().as_deref(), Some("Bearer AAA"));
    }

    #[test]
    fn test_response_without_access_token_fails() {
        let clock = ManualClock::starting_at(0);
        let mut manager = manager(&clock);
        let mut transport =
            MemoryTransport::new().with_response(http_response(200, r#"{"expires_in":3600}"#));

        let err = manager.try_refresh(&mut transport).unwrap_err();
        assert!(matches!(err, TokenError::MissingAccessToken));
        assert_eq!(manager.state(), TokenState::Unauthenticated);
    }

    #[test]
    fn test_refresh_status_error() {
        let clock = ManualClock::starting_at(0);
        let mut manager = manager(&clock);
        let mut transport = MemoryTransport::new().with_response(http_response(500, "{}"));

        let err = manager.try_refresh(&mut transport).unwrap_err();
        assert!(matches!(err, TokenError::Status { status: 500 }));
    }

    #[test]
    fn test_exchange_authorization_code() {
        let clock = ManualClock::starting_at(0);
        let mut manager = manager(&clock);
        let mut transport = MemoryTransport::new().with_response(http_response(
            200,
            r#"{"access_token":"AAA","token_type":"Bearer","expires_in":3600,"refresh_token":"new-refresh","scope":"user-read-playback-state"}"#,
        ));

        let refresh = manager.exchange_authorization_code(&mut transport, "the-code", "http://localhost/cb");
        assert_eq!(refresh, "new-refresh");
        assert_eq!(manager.credentials().refresh_token.expose(), "new-refresh");
        assert_eq!(manager.state(), TokenState::Valid);

        let request = transport.last_request_text().unwrap();
        assert!(request.contains(
            "grant_type=authorization_code&code=the-code&redirect_uri=http%3A%2F%2Flocalhost%2Fcb&client_id=client&client_secret=s3cret"
        ));
    }

    #[test]
    fn test_exchange_failure_returns_previous_refresh_token() {
        let clock = ManualClock::starting_at(0);
        let mut manager = manager(&clock);
        let mut transport = MemoryTransport::new().refuse_connections();

        let refresh = manager.exchange_authorization_code(&mut transport, "code", "http://localhost/cb");
        assert_eq!(refresh, "old-refresh");
        assert_eq!(manager.state(), TokenState::Unauthenticated);
    }

    #[test]
    fn test_exchange_status_error_returns_previous_refresh_token() {
        let clock = ManualClock::starting_at(0);
        let mut manager = manager(&clock);
        let mut transport = MemoryTransport::new().with_response(http_response(
            400,
            r#"{"error":"invalid_grant","error_description":"Invalid authorization code"}"#,
        ));

        let refresh = manager.exchange_authorization_code(&mut transport, "stale-code", "http://localhost/cb");
        assert_eq!(refresh, "old-refresh");
        assert_eq!(manager.credentials().refresh_token.expose(), "old-refresh");
        assert_eq!(manager.state(), TokenState::Unauthenticated);
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_refresh_with_huge_expires_in() {
        let clock = ManualClock::starting_at(0);
        let mut manager = manager(&clock);
        let mut transport = MemoryTransport::new().with_response(http_response(
            200,
            r#"{"access_token":"AAA","expires_in":9999999999999}"#,
        ));

        assert!(manager.refresh(&mut transport));
        assert_eq!(manager.state(), TokenState::Valid);
        assert_eq!(manager.authorization_header().as_deref(), Some("Bearer AAA"));
    }

    #[test]
    fn test_wall_clock_expiry_out_of_range() {
        assert!(wall_clock_expiry(3_598_000).is_some());
        assert!(wall_clock_expiry(u64::MAX).is_none());
        assert!(wall_clock_expiry(9_999_999_999_999_000).is_none());
    }

    #[test]
    fn test_static_access_token_never_refreshes() {
        let clock = ManualClock::starting_at(0);
        let mut manager = manager(&clock).with_access_token("static");
        let mut transport = MemoryTransport::new();

        clock.advance(365 * 24 * 3_600_000);
        assert!(manager.ensure_valid(&mut transport));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_set_refresh_token() {
        let clock = ManualClock::starting_at(0);
        let mut manager = manager(&clock);
        manager.set_refresh_token("from-disk");
        assert_eq!(manager.credentials().refresh_token.expose(), "from-disk");
    }
}
