//! Blocking byte-stream transports.
//!
//! This module provides:
//! - [`Transport`] - Trait for a connect/write/read stream with one live connection
//! - [`MemoryTransport`] - Scripted in-memory implementation for testing
//! - `TlsTransport` (with `tls` feature) - TCP + rustls
//!
//! A transport is a single connection slot. The HTTP layer writes a request and
//! then reads the response directly off the stream, so implementations expose
//! [`BufRead`] for peeking and incremental scanning.

use std::io::{BufRead, Write};
use std::time::Duration;

pub mod memory;

#[cfg(feature = "tls")]
pub mod tls;

pub use memory::{MemoryTransport, http_response};

#[cfg(feature = "tls")]
pub use tls::TlsTransport;

/// Abstraction over the socket the client talks through.
///
/// Implementations include:
/// - [`MemoryTransport`] - Scripted responses for testing
/// - `TlsTransport` (with `tls` feature) - TLS over TCP
pub trait Transport: BufRead + Write {
    /// Open a connection to `host:port`, replacing any existing one.
    fn connect(&mut self, host: &str, port: u16) -> std::io::Result<()>;

    /// Whether a connection is currently open.
    fn is_connected(&self) -> bool;

    /// Number of bytes that can be read without blocking.
    ///
    /// This is a lower bound. Implementations may hold received data they
    /// cannot report here (e.g. TLS records not yet decrypted), so `0` does
    /// not mean a read would block.
    fn available(&self) -> usize;

    /// Set the read/write timeout for the current and future connections.
    fn set_timeout(&mut self, timeout: Duration);

    /// Close the connection, if any.
    ///
    /// Unread response bytes are discarded.
    fn stop(&mut self);
}
