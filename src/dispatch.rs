//! Protocol dispatch: one request over whatever ALPN selected.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{ConnectionTarget, RequestSpec};
use crate::error::{Error, Result};
use crate::fingerprint::Http2Settings;
use crate::response::ProbeResult;
use crate::transport::h1::H1Connection;
use crate::transport::{h2, EstablishedChannel, NegotiatedProtocol};

/// Run exactly one exchange on `channel`.
///
/// `h2` goes through an HTTP/2 client connection; `http/1.1` and a missing
/// ALPN answer both use HTTP/1.1 framing directly on the stream. Any other
/// tag fails without writing anything. The channel is consumed and closed on
/// every path.
pub async fn dispatch<S>(
    channel: EstablishedChannel<S>,
    target: &ConnectionTarget,
    request: &RequestSpec,
) -> Result<ProbeResult>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (stream, protocol, _) = channel.into_parts();
    match protocol {
        NegotiatedProtocol::H2 => {
            h2::round_trip(
                stream,
                &Http2Settings::default(),
                request.method(),
                target,
                &request.headers,
            )
            .await
        }
        NegotiatedProtocol::Http11 | NegotiatedProtocol::Absent => {
            let mut conn = H1Connection::new(stream);
            let result = conn
                .round_trip(&request.method(), target, &request.headers)
                .await?;
            if !conn.buffered().is_empty() {
                tracing::warn!(
                    bytes = conn.buffered().len(),
                    "server sent data past the end of the response"
                );
            }
            conn.shutdown().await;
            Ok(result)
        }
        NegotiatedProtocol::Other(tag) => Err(Error::UnsupportedProtocol(tag)),
    }
}
