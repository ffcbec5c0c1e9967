//! RFC 9110/9112 HTTP/1.1 client for a single exchange.
//!
//! Uses httparse for response parsing and raw I/O for full control over
//! request formatting and header order.

use std::io;

use bytes::Bytes;
use http::Method;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::ConnectionTarget;
use crate::error::{Error, Result};
use crate::headers::{RequestHeaders, DEFAULT_USER_AGENT};
use crate::response::ProbeResult;

/// Maximum response header size (64KB).
const MAX_HEADERS_SIZE: usize = 64 * 1024;

/// Maximum number of headers to parse.
const MAX_HEADERS_COUNT: usize = 100;

const READ_CHUNK: usize = 8192;

/// HTTP/1.1 exchange over an established stream.
///
/// All reads go through one buffer, so bytes the server sends after the end
/// of the response stay in [`H1Connection::buffered`] and never leak into
/// the body.
pub struct H1Connection<S> {
    stream: S,
    buffer: Vec<u8>,
}

/// Parsed status line and header block.
struct ResponseHead {
    status: u16,
    version: String,
    headers: Vec<(String, String)>,
}

impl ResponseHead {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl<S> H1Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Bytes read from the stream but not part of the response.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Write one request and read exactly one final response.
    pub async fn round_trip(
        &mut self,
        method: &Method,
        target: &ConnectionTarget,
        headers: &RequestHeaders,
    ) -> Result<ProbeResult> {
        let request = build_request(method, target, headers)?;
        self.stream
            .write_all(&request)
            .await
            .map_err(|e| Error::request(format!("Failed to write request: {}", e)))?;
        self.stream
            .flush()
            .await
            .map_err(|e| Error::request(format!("Failed to flush: {}", e)))?;

        self.read_response(method).await
    }

    /// Close the write side. Errors are ignored; the response is already read.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(error = %e, "HTTP/1.1 shutdown failed");
        }
    }

    /// Read more bytes into the buffer. Returns 0 at EOF.
    async fn fill(&mut self) -> Result<usize> {
        self.fill_raw()
            .await
            .map_err(|e| Error::response_parse(format!("Failed to read response: {}", e)))
    }

    async fn fill_raw(&mut self) -> io::Result<usize> {
        let start = self.buffer.len();
        self.buffer.resize(start + READ_CHUNK, 0);
        let read = self.stream.read(&mut self.buffer[start..]).await;
        let n = *read.as_ref().unwrap_or(&0);
        self.buffer.truncate(start + n);
        read
    }

    /// Per RFC 9112 Section 6, consumes 1xx informational responses until a
    /// final one arrives.
    async fn read_response(&mut self, method: &Method) -> Result<ProbeResult> {
        loop {
            let head = self.read_head().await?;
            if (100..200).contains(&head.status) {
                tracing::debug!(status = head.status, "skipping informational response");
                continue;
            }

            // Per RFC 9112 Section 6.1: HEAD responses and 204/304 have no body
            let has_body = !matches!(head.status, 204 | 304) && *method != Method::HEAD;
            let body = if has_body {
                self.read_body(&head).await?
            } else {
                Bytes::new()
            };

            return Ok(ProbeResult {
                status: head.status,
                version: head.version,
                headers: head.headers,
                body,
            });
        }
    }

    /// Parse one status line + header block, removing it from the buffer.
    async fn read_head(&mut self) -> Result<ResponseHead> {
        loop {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
            let mut response = httparse::Response::new(&mut headers);

            let parsed = response.parse(&self.buffer).map_err(|e| {
                Error::response_parse(format!("Failed to parse response: {}", e))
            })?;

            if let httparse::Status::Complete(len) = parsed {
                let status = response
                    .code
                    .ok_or_else(|| Error::response_parse("Missing status code"))?;
                let head = ResponseHead {
                    status,
                    version: format!("HTTP/1.{}", response.version.unwrap_or(1)),
                    headers: response
                        .headers
                        .iter()
                        .map(|h| {
                            (
                                h.name.to_string(),
                                String::from_utf8_lossy(h.value).into_owned(),
                            )
                        })
                        .collect(),
                };
                self.buffer.drain(..len);
                return Ok(head);
            }

            if self.buffer.len() >= MAX_HEADERS_SIZE {
                return Err(Error::response_parse("Response headers too large"));
            }
            if self.fill().await? == 0 {
                return Err(Error::response_parse(
                    "Connection closed before response complete",
                ));
            }
        }
    }

    /// Per RFC 9112 Section 6.3: Transfer-Encoding overrides Content-Length;
    /// chunked must be the final coding; anything else is close-delimited.
    async fn read_body(&mut self, head: &ResponseHead) -> Result<Bytes> {
        if let Some(te) = head.header("transfer-encoding") {
            let chunked = te
                .split(',')
                .next_back()
                .is_some_and(|s| s.trim().eq_ignore_ascii_case("chunked"));
            return if chunked {
                self.read_chunked().await
            } else {
                self.read_until_close().await
            };
        }

        match head.header("content-length") {
            Some(value) => {
                let len = parse_content_length(value)?;
                self.read_fixed(len).await
            }
            None => self.read_until_close().await,
        }
    }

    /// Per RFC 9112: closing before `len` bytes is an incomplete message.
    async fn read_fixed(&mut self, len: usize) -> Result<Bytes> {
        while self.buffer.len() < len {
            if self.fill().await? == 0 {
                return Err(Error::response_parse(format!(
                    "Connection closed before receiving full body (got {} of {} bytes)",
                    self.buffer.len(),
                    len
                )));
            }
        }
        Ok(Bytes::from(self.buffer.drain(..len).collect::<Vec<u8>>()))
    }

    /// A close-delimited body ends at EOF, with or without a TLS close_notify.
    async fn read_until_close(&mut self) -> Result<Bytes> {
        loop {
            match self.fill_raw().await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    tracing::warn!(error = %e, "peer closed without close_notify; ending body");
                    break;
                }
                Err(e) => {
                    return Err(Error::response_parse(format!(
                        "Failed to read response: {}",
                        e
                    )))
                }
            }
        }
        Ok(Bytes::from(std::mem::take(&mut self.buffer)))
    }

    /// chunked-body = *chunk last-chunk trailer-section CRLF
    async fn read_chunked(&mut self) -> Result<Bytes> {
        let mut body = Vec::new();
        loop {
            let line_end = self.read_line().await?;
            let size = parse_chunk_size(&self.buffer[..line_end - 2])?;
            self.buffer.drain(..line_end);

            if size == 0 {
                self.consume_trailers().await?;
                return Ok(Bytes::from(body));
            }

            let chunk_end = size
                .checked_add(2)
                .ok_or_else(|| Error::response_parse("Chunk size too large"))?;
            while self.buffer.len() < chunk_end {
                if self.fill().await? == 0 {
                    return Err(Error::response_parse(
                        "Connection closed while reading chunk data",
                    ));
                }
            }
            if &self.buffer[size..chunk_end] != b"\r\n" {
                return Err(Error::response_parse("Missing CRLF after chunk data"));
            }
            body.extend_from_slice(&self.buffer[..size]);
            self.buffer.drain(..chunk_end);
        }
    }

    /// Per RFC 9112 Section 7.1.2: trailer fields are read and discarded up
    /// to the terminating empty line.
    async fn consume_trailers(&mut self) -> Result<()> {
        loop {
            let line_end = match find_crlf(&self.buffer) {
                Some(pos) => pos + 2,
                None => {
                    if self.fill().await? == 0 {
                        // Trailer section cut off by close; the body is complete
                        return Ok(());
                    }
                    continue;
                }
            };
            self.buffer.drain(..line_end);
            if line_end == 2 {
                return Ok(());
            }
        }
    }

    /// Position just past the next CRLF, reading as needed.
    async fn read_line(&mut self) -> Result<usize> {
        loop {
            if let Some(pos) = find_crlf(&self.buffer) {
                return Ok(pos + 2);
            }
            if self.buffer.len() >= MAX_HEADERS_SIZE {
                return Err(Error::response_parse("Chunk size line too long"));
            }
            if self.fill().await? == 0 {
                return Err(Error::response_parse(
                    "Connection closed while reading chunk size",
                ));
            }
        }
    }
}

/// Serialize the request head. The probe never sends a body.
///
/// `Host` is always the TLS Server Name; a user `Host` header is dropped.
fn build_request(
    method: &Method,
    target: &ConnectionTarget,
    headers: &RequestHeaders,
) -> Result<Vec<u8>> {
    for (name, value) in headers.iter() {
        validate_header_name(name)?;
        validate_header_value(value)?;
    }

    let mut request = Vec::with_capacity(512);
    request.extend_from_slice(method.as_str().as_bytes());
    request.push(b' ');
    request.extend_from_slice(target.path().as_bytes());
    request.extend_from_slice(b" HTTP/1.1\r\n");

    request.extend_from_slice(b"Host: ");
    request.extend_from_slice(target.server_name().as_bytes());
    request.extend_from_slice(b"\r\n");

    if !headers.contains("user-agent") {
        request.extend_from_slice(b"User-Agent: ");
        request.extend_from_slice(DEFAULT_USER_AGENT.as_bytes());
        request.extend_from_slice(b"\r\n");
    }

    for (name, value) in headers.iter() {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        request.extend_from_slice(name.as_bytes());
        request.extend_from_slice(b": ");
        request.extend_from_slice(value.as_bytes());
        request.extend_from_slice(b"\r\n");
    }

    // Single exchange: ask the server to close after responding
    if !headers.contains("connection") {
        request.extend_from_slice(b"Connection: close\r\n");
    }

    request.extend_from_slice(b"\r\n");
    Ok(request)
}

/// Parse a chunk-size line (without CRLF); extensions after `;` are ignored.
fn parse_chunk_size(line: &[u8]) -> Result<usize> {
    let line = std::str::from_utf8(line)
        .map_err(|_| Error::response_parse("Invalid chunk size line"))?;
    let size = line.split(';').next().unwrap_or_default().trim();
    usize::from_str_radix(size, 16)
        .map_err(|_| Error::response_parse(format!("Invalid chunk size: {:?}", size)))
}

/// Find the first CRLF in a buffer, returning its position.
fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\r\n")
}

/// Validate a header name per RFC 9110 Section 5.1.
///
/// Header names must be tokens: 1*tchar where tchar excludes
/// delimiters, control characters, and whitespace.
fn validate_header_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::request("Empty header name"));
    }
    if !name.bytes().all(is_tchar) {
        return Err(Error::request(format!(
            "Invalid character in header name: {:?}",
            name
        )));
    }
    Ok(())
}

/// Check if a byte is a valid token character per RFC 9110.
fn is_tchar(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'|' | b'~' | b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z'
    )
}

/// Header values must not contain NUL, CR, or LF (header injection).
fn validate_header_value(value: &str) -> Result<()> {
    if value.bytes().any(|b| b == 0 || b == b'\r' || b == b'\n') {
        return Err(Error::request(
            "Invalid character in header value (CR/LF/NUL not allowed)",
        ));
    }
    Ok(())
}

/// Parse a Content-Length value per RFC 9112 Section 6.2.
///
/// Repeated comma-separated values must all be identical.
fn parse_content_length(value: &str) -> Result<usize> {
    let invalid = || Error::response_parse(format!("Invalid Content-Length: {}", value));

    let mut parts = value.split(',').map(str::trim);
    let first = parts
        .next()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(invalid)?;

    for part in parts {
        let val = part.parse::<usize>().map_err(|_| invalid())?;
        if val != first {
            return Err(Error::response_parse(format!(
                "Conflicting Content-Length values: {}",
                value
            )));
        }
    }

    Ok(first)
}
