//! Credentials and access tokens.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`Credentials`] - Client id, client secret and refresh token
//! - [`AccessToken`] - A bearer token with its heuristic expiry

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Milliseconds shaved off every token lifetime so a refresh happens before
/// the server starts rejecting the old token.
pub const EXPIRY_MARGIN_MS: u64 = 2000;

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the memory is zeroed on drop.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Application credentials plus the user's refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: Secret,
    pub refresh_token: Secret,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret),
            refresh_token: Secret::new(refresh_token),
        }
    }

    /// Credentials without a refresh token, for an initial code exchange.
    pub fn without_refresh_token(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::new(client_id, client_secret, "")
    }
}

/// A bearer access token.
///
/// `ttl_ms` already has [`EXPIRY_MARGIN_MS`] taken off, so the token is due
/// for refresh once `now - issued_at_ms >= ttl_ms`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: Secret,
    issued_at_ms: u64,
    ttl_ms: u64,
}

impl AccessToken {
    /// Token issued at `issued_at_ms` that the server says lives `expires_in_secs`.
    pub fn issued(value: impl Into<String>, issued_at_ms: u64, expires_in_secs: u64) -> Self {
        let ttl_ms = expires_in_secs
            .saturating_mul(1000)
            .saturating_sub(EXPIRY_MARGIN_MS);
        Self {
            value: Secret::new(value),
            issued_at_ms,
            ttl_ms,
        }
    }

    /// Token that is never considered due for refresh.
    pub fn non_expiring(value: impl Into<String>) -> Self {
        Self {
            value: Secret::new(value),
            issued_at_ms: 0,
            ttl_ms: u64::MAX,
        }
    }

    pub fn value(&self) -> &Secret {
        &self.value
    }

    pub fn issued_at_ms(&self) -> u64 {
        self.issued_at_ms
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// Clock reading at which the token becomes due.
    pub fn expires_at_ms(&self) -> u64 {
        self.issued_at_ms.saturating_add(self.ttl_ms)
    }

    /// Whether the refresh heuristic says this token should be replaced.
    pub fn is_due(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.issued_at_ms) >= self.ttl_ms
    }

    /// `Authorization` header value.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.value.expose())
    }
}
