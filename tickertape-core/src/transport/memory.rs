//! In-memory transport implementation.

use std::collections::VecDeque;
use std::io::{self, BufRead, Cursor, Read, Write};
use std::time::Duration;

use super::Transport;

/// In-memory transport for testing and development.
///
/// Responses are queued up front. Each new request (the first write after a
/// connect or after reading) records a request buffer and loads the next
/// queued response as the readable stream. When the queue is empty the
/// stream reads as end-of-file.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    responses: VecDeque<Vec<u8>>,
    incoming: Cursor<Vec<u8>>,
    requests: Vec<Vec<u8>>,
    connections: Vec<(String, u16)>,
    connected: bool,
    writing: bool,
    refuse_connections: bool,
    fail_writes: bool,
    timeout: Option<Duration>,
}

impl MemoryTransport {
    /// Create a transport with no queued responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw response and return the transport.
    pub fn with_response(mut self, response: impl Into<Vec<u8>>) -> Self {
        self.push_response(response);
        self
    }

    /// Queue a raw response.
    pub fn push_response(&mut self, response: impl Into<Vec<u8>>) {
        self.responses.push_back(response.into());
    }

    /// Make every subsequent `connect` fail.
    pub fn refuse_connections(mut self) -> Self {
        self.refuse_connections = true;
        self
    }

    /// Make every subsequent write accept zero bytes.
    pub fn fail_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// All requests written so far, in order.
    pub fn requests(&self) -> &[Vec<u8>] {
        &self.requests
    }

    /// A recorded request as text.
    pub fn request_text(&self, index: usize) -> Option<String> {
        self.requests
            .get(index)
            .map(|r| String::from_utf8_lossy(r).into_owned())
    }

    /// The most recent request as text.
    pub fn last_request_text(&self) -> Option<String> {
        self.requests
            .last()
            .map(|r| String::from_utf8_lossy(r).into_owned())
    }

    /// Every `(host, port)` a connection was opened to, in order.
    pub fn connections(&self) -> &[(String, u16)] {
        &self.connections
    }

    /// Number of responses still queued.
    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }

    /// Timeout most recently set by the client.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn ensure_connected(&self) -> io::Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::NotConnected, "transport not connected"))
        }
    }

    fn remaining(&self) -> usize {
        let len = self.incoming.get_ref().len();
        let pos = usize::try_from(self.incoming.position()).unwrap_or(len);
        len.saturating_sub(pos)
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, host: &str, port: u16) -> io::Result<()> {
        self.stop();
        if self.refuse_connections {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("connection to {}:{} refused", host, port),
            ));
        }
        self.connections.push((host.to_string(), port));
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn available(&self) -> usize {
        if self.connected { self.remaining() } else { 0 }
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    fn stop(&mut self) {
        self.connected = false;
        self.writing = false;
        self.incoming = Cursor::new(Vec::new());
    }
}

impl Write for MemoryTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_connected()?;
        if self.fail_writes {
            return Ok(0);
        }
        if !self.writing {
            self.writing = true;
            self.requests.push(Vec::new());
            self.incoming = Cursor::new(self.responses.pop_front().unwrap_or_default());
        }
        if let Some(request) = self.requests.last_mut() {
            request.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ensure_connected()
    }
}

impl Read for MemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_connected()?;
        self.writing = false;
        self.incoming.read(buf)
    }
}

impl BufRead for MemoryTransport {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.ensure_connected()?;
        self.writing = false;
        self.incoming.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.incoming.consume(amt);
    }
}

/// Build a raw HTTP/1.1 response with a JSON content type.
pub fn http_response(status: u16, body: &str) -> Vec<u8> {
    let reason = match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Unknown",
    };
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_transport_request_loads_next_response() {
        let mut transport = MemoryTransport::new()
            .with_response("first")
            .with_response("second");

        transport.connect("api.example.com", 443).unwrap();
        transport.write_all(b"GET / HTTP/1.1\r\n").unwrap();
        transport.write_all(b"\r\n").unwrap();

        let mut body = String::new();
        transport.read_to_string(&mut body).unwrap();
        assert_eq!(body, "first");

        transport.write_all(b"GET /again HTTP/1.1\r\n\r\n").unwrap();
        let mut body = String::new();
        transport.read_to_string(&mut body).unwrap();
        assert_eq!(body, "second");

        assert_eq!(transport.requests().len(), 2);
        assert_eq!(
            transport.request_text(0).unwrap(),
            "GET / HTTP/1.1\r\n\r\n"
        );
    }

    #[test]
    fn test_memory_transport_refuses_connections() {
        let mut transport = MemoryTransport::new().refuse_connections();
        let err = transport.connect("api.example.com", 443).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_memory_transport_stop_discards_unread_bytes() {
        let mut transport = MemoryTransport::new().with_response("unread body");
        transport.connect("api.example.com", 443).unwrap();
        transport.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(transport.available(), "unread body".len());

        transport.stop();
        assert_eq!(transport.available(), 0);
        assert!(transport.fill_buf().is_err());
    }

    #[test]
    fn test_memory_transport_fail_writes() {
        let mut transport = MemoryTransport::new().fail_writes();
        transport.connect("api.example.com", 443).unwrap();
        let err = transport.write_all(b"GET / HTTP/1.1\r\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn test_http_response_format() {
        let raw = String::from_utf8(http_response(204, "")).unwrap();
        assert!(raw.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(raw.ends_with("Content-Length: 0\r\n\r\n"));
    }
}
