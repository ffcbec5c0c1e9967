//! HTTP/2 transport via hyper.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Method, Request};
use http_body_util::{BodyExt, Empty};
use hyper::client::conn::http2;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

use crate::config::ConnectionTarget;
use crate::error::{Error, Result};
use crate::fingerprint::Http2Settings;
use crate::headers::{RequestHeaders, DEFAULT_USER_AGENT};
use crate::response::ProbeResult;

/// Headers that are meaningless or forbidden in HTTP/2 (RFC 9113 Section 8.2.2).
const CONNECTION_SPECIFIC: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

/// Aborts the spawned connection driver when dropped.
struct ConnectionTask(JoinHandle<()>);

impl Drop for ConnectionTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Perform one request over a fresh HTTP/2 connection on `stream`.
///
/// The connection driver lives only as long as this call.
pub async fn round_trip<S>(
    stream: S,
    settings: &Http2Settings,
    method: Method,
    target: &ConnectionTarget,
    headers: &RequestHeaders,
) -> Result<ProbeResult>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let request = build_request(method, target, headers)?;

    let mut builder = http2::Builder::new(TokioExecutor::new());
    builder
        .initial_stream_window_size(settings.initial_stream_window_size)
        .initial_connection_window_size(settings.initial_connection_window_size)
        .max_frame_size(settings.max_frame_size)
        .max_header_list_size(settings.max_header_list_size);

    let (mut sender, conn) = builder
        .handshake(TokioIo::new(stream))
        .await
        .map_err(|e| Error::request(format!("HTTP/2 handshake failed: {}", e)))?;

    let _task = ConnectionTask(tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("HTTP/2 connection error: {}", e);
        }
    }));

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| Error::request(format!("HTTP/2 request failed: {}", e)))?;

    let (parts, body) = response.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| Error::response_parse(format!("Failed to read body: {}", e)))?
        .to_bytes();

    let headers = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    Ok(ProbeResult {
        status: parts.status.as_u16(),
        version: "HTTP/2".to_string(),
        headers,
        body,
    })
}

/// `:authority` is the TLS Server Name; user `Host` and connection-specific
/// headers are dropped.
fn build_request(
    method: Method,
    target: &ConnectionTarget,
    headers: &RequestHeaders,
) -> Result<Request<Empty<Bytes>>> {
    let uri = format!("https://{}{}", target.server_name(), target.path());
    let mut builder = Request::builder().method(method).uri(uri);

    let header_map = builder
        .headers_mut()
        .ok_or_else(|| Error::request("Invalid request URI"))?;

    for (name, value) in headers.iter() {
        let lower = name.to_ascii_lowercase();
        if lower == "host" || CONNECTION_SPECIFIC.contains(&lower.as_str()) {
            tracing::debug!(header = name, "dropping header not allowed in HTTP/2");
            continue;
        }
        header_map.insert(
            HeaderName::from_bytes(lower.as_bytes())
                .map_err(|e| Error::request(format!("Invalid header name {:?}: {}", name, e)))?,
            HeaderValue::from_str(value)
                .map_err(|e| Error::request(format!("Invalid header value for {}: {}", name, e)))?,
        );
    }
    if !header_map.contains_key(http::header::USER_AGENT) {
        header_map.insert(
            http::header::USER_AGENT,
            HeaderValue::from_static(DEFAULT_USER_AGENT),
        );
    }

    builder
        .body(Empty::new())
        .map_err(|e| Error::request(format!("Failed to build request: {}", e)))
}
