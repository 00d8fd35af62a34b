//! Minimal HTTP/1.1 request writer.
//!
//! This module provides:
//! - [`Request`] - Builder for a single request
//! - [`send`] - Write a request over a [`Transport`] and read the status code
//! - [`RequestError`] - Connect, write and status-line failures
//!
//! [`send`] stops right after the status code. The caller decides whether to
//! scan headers and stream a JSON body, or just close the connection.

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use thiserror::Error;

use crate::response;
use crate::transport::Transport;

/// Default API host.
pub const API_HOST: &str = "api.spotify.com";

/// Default accounts (token endpoint) host.
pub const ACCOUNTS_HOST: &str = "accounts.spotify.com";

/// Default TLS port.
pub const HTTPS_PORT: u16 = 443;

/// Content type of player command bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type of token endpoint bodies.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Error type for sending a request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The connection could not be established.
    #[error("connection to {host}:{port} failed: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Writing the request failed or accepted zero bytes.
    #[error("failed to send request: {0}")]
    Write(#[source] io::Error),

    /// No `HTTP/1.1` status line came back.
    #[error("no HTTP status line in response")]
    MissingStatusLine,
}

impl RequestError {
    /// Numeric status-code stand-in: `-1` for connect and status-line
    /// failures, `-2` for write failures.
    pub fn code(&self) -> i32 {
        match self {
            RequestError::Connect { .. } | RequestError::MissingStatusLine => -1,
            RequestError::Write(_) => -2,
        }
    }
}

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }

    fn has_body(&self) -> bool {
        !matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single HTTP request.
#[derive(Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    path: String,
    host: String,
    port: u16,
    authorization: Option<String>,
    accept: Option<String>,
    content_type: String,
    body: String,
}

impl Request {
    /// Create a request against the default API host.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            host: API_HOST.to_string(),
            port: HTTPS_PORT,
            authorization: None,
            accept: Some(JSON_CONTENT_TYPE.to_string()),
            content_type: JSON_CONTENT_TYPE.to_string(),
            body: String::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    /// Set the target host and port.
    pub fn host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the `Authorization` header value.
    pub fn authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Set the `Accept` header of a GET; `None` omits it.
    ///
    /// POST and PUT always accept `application/json`.
    pub fn accept(mut self, accept: Option<&str>) -> Self {
        self.accept = accept.map(str::to_string);
        self
    }

    /// Set the body and its content type.
    pub fn body(mut self, body: impl Into<String>, content_type: &str) -> Self {
        self.body = body.into();
        self.content_type = content_type.to_string();
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn target_host(&self) -> &str {
        &self.host
    }

    pub fn target_port(&self) -> u16 {
        self.port
    }

    /// Serialize the request as it goes on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("{} {} HTTP/1.1\r\nHost: {}\r\n", self.method, self.path, self.host);

        if self.method.has_body() {
            out.push_str("Accept: application/json\r\n");
            out.push_str(&format!("Content-Type: {}\r\n", self.content_type));
        } else if let Some(accept) = &self.accept {
            out.push_str(&format!("Accept: {}\r\n", accept));
        }

        if let Some(authorization) = &self.authorization {
            out.push_str(&format!("Authorization: {}\r\n", authorization));
        }

        out.push_str("Cache-Control: no-cache\r\n");

        if self.method.has_body() {
            out.push_str(&format!("Content-Length: {}\r\n\r\n", self.body.len()));
            out.push_str(&self.body);
        }

        out.push_str("\r\n");
        out.into_bytes()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("authorization", &self.authorization.as_ref().map(|_| "[REDACTED]"))
            .field("content_type", &self.content_type)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Send `request` and read the response status code.
///
/// A GET reuses an already open connection; POST and PUT always connect
/// afresh. On success the stream is positioned right after the status code.
pub fn send<T: Transport + ?Sized>(
    transport: &mut T,
    request: &Request,
    timeout: Duration,
) -> Result<u16, RequestError> {
    transport.set_timeout(timeout);

    if request.method.has_body() || !transport.is_connected() {
        tracing::debug!("Connecting to {}:{}", request.host, request.port);
        transport
            .connect(&request.host, request.port)
            .map_err(|source| {
                tracing::warn!("Connection failed: {}", source);
                RequestError::Connect {
                    host: request.host.clone(),
                    port: request.port,
                    source,
                }
            })?;
    }

    tracing::debug!("{} {}", request.method, request.path);

    transport
        .write_all(&request.to_bytes())
        .and_then(|()| transport.flush())
        .map_err(|e| {
            tracing::warn!("Failed to send request: {}", e);
            RequestError::Write(e)
        })?;

    match response::read_status_code(transport) {
        Ok(Some(status)) => Ok(status),
        Ok(None) => Err(RequestError::MissingStatusLine),
        Err(e) => {
            tracing::warn!("Failed to read status line: {}", e);
            Err(RequestError::MissingStatusLine)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryTransport, http_response};

    const TIMEOUT: Duration = Duration::from_millis(4000);

    #[test]
    fn test_get_request_format() {
        let request = Request::get("/v1/me/player/currently-playing")
            .authorization("Bearer abc");

        let text = String::from_utf8(request.to_bytes()).unwrap();
        assert_eq!(
            text,
            "GET /v1/me/player/currently-playing HTTP/1.1\r\n\
             Host: api.spotify.com\r\n\
             Accept: application/json\r\n\
             Authorization: Bearer abc\r\n\
             Cache-Control: no-cache\r\n\
             \r\n"
        );
    }

    #[test]
    fn test_put_request_format() {
        let request = Request::put("/v1/me/player")
            .authorization("Bearer abc")
            .body(r#"{"play":"true"}"#, JSON_CONTENT_TYPE);

        let text = String::from_utf8(request.to_bytes()).unwrap();
        assert_eq!(
            text,
            "PUT /v1/me/player HTTP/1.1\r\n\
             Host: api.spotify.com\r\n\
             Accept: application/json\r\n\
             Content-Type: application/json\r\n\
             Authorization: Bearer abc\r\n\
             Cache-Control: no-cache\r\n\
             Content-Length: 15\r\n\
             \r\n\
             {\"play\":\"true\"}\r\n"
        );
    }

    #[test]
    fn test_get_without_accept_header() {
        let request = Request::get("/").accept(None);
        let text = String::from_utf8(request.to_bytes()).unwrap();
        assert!(!text.contains("Accept:"));
    }

    #[test]
    fn test_debug_redacts_authorization() {
        let request = Request::get("/").authorization("Bearer secret-token");
        let debug = format!("{:?}", request);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_send_returns_status_code() {
        let mut transport = MemoryTransport::new().with_response(http_response(204, ""));

        let status = send(&mut transport, &Request::put("/v1/me/player/pause"), TIMEOUT).unwrap();
        assert_eq!(status, 204);
        assert_eq!(transport.timeout(), Some(TIMEOUT));
        assert_eq!(
            transport.connections(),
            &[("api.spotify.com".to_string(), 443)]
        );
    }

    #[test]
    fn test_get_reuses_open_connection() {
        let mut transport = MemoryTransport::new()
            .with_response(http_response(204, ""))
            .with_response(http_response(204, ""));

        send(&mut transport, &Request::get("/a"), TIMEOUT).unwrap();
        send(&mut transport, &Request::get("/b"), TIMEOUT).unwrap();
        assert_eq!(transport.connections().len(), 1);
    }

    #[test]
    fn test_post_always_reconnects() {
        let mut transport = MemoryTransport::new()
            .with_response(http_response(204, ""))
            .with_response(http_response(204, ""));

        send(&mut transport, &Request::post("/a"), TIMEOUT).unwrap();
        send(&mut transport, &Request::post("/b"), TIMEOUT).unwrap();
        assert_eq!(transport.connections().len(), 2);
    }

    #[test]
    fn test_send_error_codes() {
        let mut refused = MemoryTransport::new().refuse_connections();
        let err = send(&mut refused, &Request::get("/"), TIMEOUT).unwrap_err();
        assert!(matches!(err, RequestError::Connect { .. }));
        assert_eq!(err.code(), -1);

        let mut broken = MemoryTransport::new().fail_writes();
        let err = send(&mut broken, &Request::get("/"), TIMEOUT).unwrap_err();
        assert!(matches!(err, RequestError::Write(_)));
        assert_eq!(err.code(), -2);

        let mut garbage = MemoryTransport::new().with_response("not http");
        let err = send(&mut garbage, &Request::get("/"), TIMEOUT).unwrap_err();
        assert!(matches!(err, RequestError::MissingStatusLine));
        assert_eq!(err.code(), -1);
    }
}
