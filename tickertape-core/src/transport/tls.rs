//! TLS-over-TCP transport implementation.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

use super::Transport;

/// Default socket timeout, matching [`crate::ClientConfig`]'s default.
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(4000);

type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// Blocking TLS transport backed by rustls and the Mozilla root store.
///
/// Holds at most one connection. Reads are buffered so the response scanner
/// can peek without consuming.
pub struct TlsTransport {
    config: Arc<ClientConfig>,
    timeout: Duration,
    stream: Option<BufReader<TlsStream>>,
}

impl TlsTransport {
    /// Create a transport trusting the bundled web PKI roots.
    pub fn new() -> io::Result<Self> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(io::Error::other)?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self::with_config(Arc::new(config)))
    }

    /// Create a transport with a caller-supplied rustls configuration.
    pub fn with_config(config: Arc<ClientConfig>) -> Self {
        Self {
            config,
            timeout: DEFAULT_TIMEOUT,
            stream: None,
        }
    }

    fn open_socket(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let mut last_error = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(socket) => return Ok(socket),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses resolved for {}", host),
            )
        }))
    }

    fn stream_mut(&mut self) -> io::Result<&mut BufReader<TlsStream>> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport not connected"))
    }
}

impl fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsTransport")
            .field("timeout", &self.timeout)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

impl Transport for TlsTransport {
    fn connect(&mut self, host: &str, port: u16) -> io::Result<()> {
        self.stop();

        let socket = self.open_socket(host, port)?;
        socket.set_read_timeout(Some(self.timeout))?;
        socket.set_write_timeout(Some(self.timeout))?;
        socket.set_nodelay(true)?;

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let connection =
            ClientConnection::new(Arc::clone(&self.config), server_name).map_err(io::Error::other)?;

        tracing::debug!("Connected to {}:{}", host, port);
        self.stream = Some(BufReader::new(StreamOwned::new(connection, socket)));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Bytes in the read buffer. Plaintext still held inside the rustls
    /// connection is not counted.
    fn available(&self) -> usize {
        self.stream.as_ref().map_or(0, |s| s.buffer().len())
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        if let Some(stream) = &self.stream {
            let socket = &stream.get_ref().sock;
            if let Err(e) = socket.set_read_timeout(Some(timeout)) {
                tracing::debug!("Failed to set read timeout: {}", e);
            }
            if let Err(e) = socket.set_write_timeout(Some(timeout)) {
                tracing::debug!("Failed to set write timeout: {}", e);
            }
        }
    }

    fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let tls = stream.get_mut();
            tls.conn.send_close_notify();
            let _ = tls.flush();
            let _ = tls.sock.shutdown(Shutdown::Both);
            tracing::debug!("Closed connection");
        }
    }
}

impl Read for TlsTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream_mut()?.read(buf)
    }
}

impl BufRead for TlsTransport {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.stream_mut()?.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        if let Some(stream) = self.stream.as_mut() {
            stream.consume(amt);
        }
    }
}

impl Write for TlsTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream_mut()?.get_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(stream) => stream.get_mut().flush(),
            None => Ok(()),
        }
    }
}

impl Drop for TlsTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_transport_starts_disconnected() {
        let mut transport = TlsTransport::new().unwrap();
        assert!(!transport.is_connected());
        assert_eq!(transport.available(), 0);

        let err = transport.fill_buf().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
