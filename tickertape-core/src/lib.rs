//! # Tickertape Core
//!
//! Core library for the tickertape now-playing client.
//!
//! This crate provides:
//! - A blocking [`Transport`] abstraction with TLS and in-memory implementations
//! - A minimal HTTP/1.1 request builder and response scanner
//! - A [`TokenManager`] that refreshes Spotify access tokens on a time heuristic
//! - An allow-list [`Filter`] and fixed-capacity JSON document decoder
//! - Playback, audio-feature and device snapshots for a display to consume
//! - A [`SpotifyClient`] that ties the above together
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tickertape_core::{ClientConfig, Credentials, SpotifyClient, TlsTransport};
//!
//! fn poll() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = Credentials::new("client-id", "client-secret", "refresh-token");
//!     let transport = TlsTransport::new()?;
//!     let mut client = SpotifyClient::new(transport, credentials, ClientConfig::default());
//!
//!     let snapshot = client.currently_playing(None);
//!     if !snapshot.error {
//!         println!("{} - {}", snapshot.short_first_artist_name, snapshot.short_track_name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod client;
pub mod config;
pub mod credential_store;
pub mod error;
pub mod filter;
pub mod http;
pub mod player;
pub mod response;
pub mod snapshot;
pub mod text;
pub mod token;
pub mod token_manager;
pub mod transport;

// Re-export commonly used types at crate root
pub use clock::{Clock, ManualClock, SystemClock};

pub use client::SpotifyClient;

pub use config::ClientConfig;

pub use credential_store::{CredentialStore, CredentialStoreError};

pub use error::ApiError;

pub use filter::{DecodeError, Filter, FilteredDocument};

pub use http::{Method, Request, RequestError};

pub use player::{PlayerCommand, RepeatMode};

pub use snapshot::{AudioFeatureSnapshot, Device, DeviceSnapshot, Mode, PlaybackSnapshot, PollOutcome};

pub use token::{AccessToken, Credentials, Secret};

pub use token_manager::{TokenError, TokenManager, TokenState};

pub use transport::{MemoryTransport, Transport};

#[cfg(feature = "tls")]
pub use transport::TlsTransport;
