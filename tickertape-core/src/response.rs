//! HTTP response scanning.
//!
//! The client never parses a response into a header map. After a request is
//! sent the stream sits just past the status code, and these helpers move
//! forward through it: find the header terminator, optionally toss stray bytes
//! ahead of a JSON body, then hand the stream to the JSON decoder.
//!
//! Scans are timeout-aware: a read that times out ends the scan as
//! "not found" rather than as an error, the same way a stream `find` on a
//! microcontroller gives up after its timeout.

use std::io::{self, BufRead, Read};

use crate::filter::{self, Filter, FilteredDocument};
use crate::transport::Transport;

/// Marks the end of the HTTP header block.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Capacity of the document used to decode error bodies for logging.
pub const ERROR_BODY_CAPACITY: usize = 1000;

const STATUS_LINE_MARKER: &[u8] = b"HTTP/1.1";
const CONTENT_LENGTH_MARKER: &[u8] = b"content-length:";

/// Peek at the next byte without consuming it.
///
/// Returns `Ok(None)` at end of stream or on a read timeout.
pub fn peek_byte<R: BufRead + ?Sized>(reader: &mut R) -> io::Result<Option<u8>> {
    loop {
        match reader.fill_buf() {
            Ok(buf) => return Ok(buf.first().copied()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(&e) => return Ok(None),
            Err(e) => return Err(e),
        }
    }
}

fn next_byte<R: BufRead + ?Sized>(reader: &mut R) -> io::Result<Option<u8>> {
    let byte = peek_byte(reader)?;
    if byte.is_some() {
        reader.consume(1);
    }
    Ok(byte)
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// Consume bytes up to and including the first occurrence of `needle`.
///
/// Returns `Ok(false)` if the stream ends (or times out) first.
pub fn find<R: BufRead + ?Sized>(reader: &mut R, needle: &[u8]) -> io::Result<bool> {
    find_by(reader, needle, |a, b| a == b)
}

/// Like [`find`], comparing ASCII letters case-insensitively.
pub fn find_ignore_case<R: BufRead + ?Sized>(reader: &mut R, needle: &[u8]) -> io::Result<bool> {
    find_by(reader, needle, |a, b| a.eq_ignore_ascii_case(&b))
}

fn find_by<R, F>(reader: &mut R, needle: &[u8], eq: F) -> io::Result<bool>
where
    R: BufRead + ?Sized,
    F: Fn(u8, u8) -> bool,
{
    if needle.is_empty() {
        return Ok(true);
    }

    // Knuth-Morris-Pratt, so "\r\n\r\r\n\r\n" still finds the terminator.
    let fallback = prefix_table(needle, &eq);
    let mut matched = 0;

    while let Some(byte) = next_byte(reader)? {
        while matched > 0 && !eq(needle[matched], byte) {
            matched = fallback[matched - 1];
        }
        if eq(needle[matched], byte) {
            matched += 1;
            if matched == needle.len() {
                return Ok(true);
            }
        }
    }

    Ok(false)
}

fn prefix_table<F: Fn(u8, u8) -> bool>(needle: &[u8], eq: &F) -> Vec<usize> {
    let mut table = vec![0; needle.len()];
    let mut len = 0;
    for i in 1..needle.len() {
        while len > 0 && !eq(needle[i], needle[len]) {
            len = table[len - 1];
        }
        if eq(needle[i], needle[len]) {
            len += 1;
        }
        table[i] = len;
    }
    table
}

/// Parse the next integer in the stream.
///
/// Skips anything that is not a digit or `-`, then reads digits up to the
/// first non-digit, which is left unconsumed. Returns `Ok(None)` if the stream
/// ends before any digit.
pub fn parse_int<R: BufRead + ?Sized>(reader: &mut R) -> io::Result<Option<i64>> {
    loop {
        match peek_byte(reader)? {
            None => return Ok(None),
            Some(b) if b.is_ascii_digit() || b == b'-' => break,
            Some(_) => reader.consume(1),
        }
    }

    let negative = peek_byte(reader)? == Some(b'-');
    if negative {
        reader.consume(1);
    }

    let mut value: i64 = 0;
    let mut digits = 0;
    while let Some(b) = peek_byte(reader)? {
        if !b.is_ascii_digit() {
            break;
        }
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
        digits += 1;
        reader.consume(1);
    }

    if digits == 0 {
        return Ok(None);
    }
    Ok(Some(if negative { -value } else { value }))
}

/// Read the numeric status code from the status line.
///
/// Returns `Ok(None)` if no `HTTP/1.1` status line is found.
pub fn read_status_code<R: BufRead + ?Sized>(reader: &mut R) -> io::Result<Option<u16>> {
    if !find(reader, STATUS_LINE_MARKER)? {
        return Ok(None);
    }
    let code = parse_int(reader)?.and_then(|code| u16::try_from(code).ok());
    tracing::debug!("Status code: {:?}", code);
    Ok(code)
}

/// Scan for a `Content-Length` header and parse its value.
///
/// Must be called before [`skip_headers`]. Returns `None` if the header is
/// absent; the stream is then positioned wherever the scan gave up.
pub fn content_length<R: BufRead + ?Sized>(reader: &mut R) -> Option<usize> {
    match find_ignore_case(reader, CONTENT_LENGTH_MARKER) {
        Ok(true) => {}
        Ok(false) => return None,
        Err(e) => {
            tracing::debug!("Failed to scan for Content-Length: {}", e);
            return None;
        }
    }

    let length = parse_int(reader)
        .ok()
        .flatten()
        .and_then(|value| usize::try_from(value).ok());
    tracing::debug!("Content-Length: {:?}", length);
    length
}

/// Skip past the response headers.
///
/// With `toss_non_json_prefix`, bytes that are already available and come
/// before the next `{` are discarded as well; some servers put stray bytes
/// between the headers and a JSON body. Only bytes reported by
/// [`Transport::available`] are inspected, so a prefix that has not reached
/// the read buffer yet is left in place.
///
/// Returns `false` if the header terminator was not found. The stream
/// position is then unspecified.
pub fn skip_headers<T: Transport + ?Sized>(transport: &mut T, toss_non_json_prefix: bool) -> bool {
    match find(transport, HEADER_TERMINATOR) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("Invalid response: end of headers not found");
            return false;
        }
        Err(e) => {
            tracing::warn!("Invalid response: {}", e);
            return false;
        }
    }

    if toss_non_json_prefix {
        while transport.available() > 0 {
            match peek_byte(transport) {
                Ok(Some(b'{')) | Ok(None) | Err(_) => break,
                Ok(Some(byte)) => {
                    tracing::trace!("Tossing an unexpected byte: {:?}", char::from(byte));
                    transport.consume(1);
                }
            }
        }
    }

    true
}

/// Decode an error-shaped JSON body and log it.
///
/// Purely diagnostic: the decoded document is returned for inspection but
/// callers are not expected to act on it.
pub fn log_error_body<R: Read>(reader: R, context: &str) -> Option<FilteredDocument> {
    match filter::decode(reader, &Filter::allow_all(), ERROR_BODY_CAPACITY) {
        Ok(document) => {
            tracing::warn!("{} error: {}", context, document.value());
            Some(document)
        }
        Err(e) => {
            tracing::warn!("{}: could not parse error body: {}", context, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryTransport, http_response};
    use std::io::{Cursor, Write};

    fn sent(response: impl Into<Vec<u8>>) -> MemoryTransport {
        let mut transport = MemoryTransport::new().with_response(response);
        transport.connect("api.example.com", 443).unwrap();
        transport.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        transport
    }

    #[test]
    fn test_find_handles_overlapping_prefix() {
        let mut reader = Cursor::new(b"abc\r\n\r\r\n\r\nrest".to_vec());
        assert!(find(&mut reader, HEADER_TERMINATOR).unwrap());

        let mut rest = String::new();
        reader.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "rest");
    }

    #[test]
    fn test_find_not_found() {
        let mut reader = Cursor::new(b"no terminator here\r\n".to_vec());
        assert!(!find(&mut reader, HEADER_TERMINATOR).unwrap());
    }

    #[test]
    fn test_parse_int_skips_leading_noise() {
        let mut reader = Cursor::new(b"  : 404 Not Found".to_vec());
        assert_eq!(parse_int(&mut reader).unwrap(), Some(404));
        assert_eq!(peek_byte(&mut reader).unwrap(), Some(b' '));

        let mut reader = Cursor::new(b"x-12y".to_vec());
        assert_eq!(parse_int(&mut reader).unwrap(), Some(-12));

        let mut reader = Cursor::new(b"none".to_vec());
        assert_eq!(parse_int(&mut reader).unwrap(), None);
    }

    #[test]
    fn test_read_status_code() {
        let mut reader = Cursor::new(http_response(204, ""));
        assert_eq!(read_status_code(&mut reader).unwrap(), Some(204));

        let mut reader = Cursor::new(b"garbage without a status line".to_vec());
        assert_eq!(read_status_code(&mut reader).unwrap(), None);
    }

    #[test]
    fn test_content_length_case_insensitive() {
        let mut reader = Cursor::new(http_response(200, "{\"a\":1}"));
        assert_eq!(content_length(&mut reader), Some(7));

        let mut reader =
            Cursor::new(b"HTTP/1.1 200 OK\r\ncontent-length: 12\r\n\r\n".to_vec());
        assert_eq!(content_length(&mut reader), Some(12));

        let mut reader = Cursor::new(b"HTTP/1.1 200 OK\r\n\r\n".to_vec());
        assert_eq!(content_length(&mut reader), None);
    }

    #[test]
    fn test_skip_headers_tosses_stray_prefix() {
        let mut transport =
            sent(b"HTTP/1.1 200 OK\r\nX: y\r\n\r\n1f4\r\n{\"ok\":true}".to_vec());
        assert_eq!(read_status_code(&mut transport).unwrap(), Some(200));
        assert!(skip_headers(&mut transport, true));

        let mut body = String::new();
        transport.read_to_string(&mut body).unwrap();
        assert_eq!(body, "{\"ok\":true}");
    }

    #[test]
    fn test_skip_headers_keeps_prefix_without_toss() {
        let mut transport = sent(b"HTTP/1.1 200 OK\r\n\r\nxx{}".to_vec());
        assert!(skip_headers(&mut transport, false));

        let mut body = String::new();
        transport.read_to_string(&mut body).unwrap();
        assert_eq!(body, "xx{}");
    }

    /// A transport that holds data it cannot report as available.
    struct Unreported(Cursor<Vec<u8>>);

    impl Read for Unreported {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl BufRead for Unreported {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            self.0.fill_buf()
        }

        fn consume(&mut self, amt: usize) {
            self.0.consume(amt)
        }
    }

    impl Write for Unreported {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Transport for Unreported {
        fn connect(&mut self, _host: &str, _port: u16) -> io::Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn available(&self) -> usize {
            0
        }

        fn set_timeout(&mut self, _timeout: std::time::Duration) {}

        fn stop(&mut self) {}
    }

    #[test]
    fn test_skip_headers_leaves_unreported_prefix() {
        let mut transport = Unreported(Cursor::new(b"HTTP/1.1 200 OK\r\n\r\n1f4\r\n{}".to_vec()));
        assert!(skip_headers(&mut transport, true));

        let mut body = String::new();
        transport.read_to_string(&mut body).unwrap();
        assert_eq!(body, "1f4\r\n{}");
    }

    #[test]
    fn test_skip_headers_missing_terminator() {
        let mut transport = sent(b"HTTP/1.1 200 OK\r\nTruncated: yes".to_vec());
        assert!(!skip_headers(&mut transport, true));
    }

    #[test]
    fn test_log_error_body() {
        let body = r#"{"error":{"status":401,"message":"The access token expired"}}"#;
        let document = log_error_body(body.as_bytes(), "currently playing").unwrap();
        assert_eq!(document.str_at("/error/message"), "The access token expired");

        assert!(log_error_body(&b"not json"[..], "currently playing").is_none());
    }
}
