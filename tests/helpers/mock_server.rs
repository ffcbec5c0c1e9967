use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use rustls::ServerConfig;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;

/// What the server saw on its single connection.
#[derive(Debug, Default)]
pub struct Observed {
    /// The raw ClientHello record, as received.
    pub client_hello: Vec<u8>,
    /// ALPN the server selected.
    pub alpn: Option<Vec<u8>>,
    /// Requests received on the connection.
    pub requests: usize,
    /// HTTP/1.1 request head, or `:path` for HTTP/2.
    pub request: String,
}

/// A TLS mock server that serves one connection over HTTP/1.1 or HTTP/2,
/// whichever ALPN selected.
pub struct MockTlsServer {
    listener: TcpListener,
    port: u16,
    config: Arc<ServerConfig>,
    raw_h1: Option<RawH1>,
}

/// A verbatim HTTP/1.1 reply and how the connection ends after it.
#[derive(Clone, Copy)]
struct RawH1 {
    response: &'static [u8],
    close_notify: bool,
}

impl MockTlsServer {
    /// Create a new mock server bound to a random port.
    pub async fn new(config: Arc<ServerConfig>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            port,
            config,
            raw_h1: None,
        })
    }

    /// Answer HTTP/1.1 with `response` as-is. Without `close_notify` the
    /// TLS stream is dropped after writing, leaving a bare TCP close.
    pub fn with_raw_h1(mut self, response: &'static [u8], close_notify: bool) -> Self {
        self.raw_h1 = Some(RawH1 {
            response,
            close_notify,
        });
        self
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accept one connection, answer every request with `body`, and report.
    pub fn start(self, body: &'static [u8]) -> tokio::task::JoinHandle<Observed> {
        tokio::spawn(async move {
            let (stream, _) = self.listener.accept().await.expect("accept failed");
            match serve(stream, self.config, body, self.raw_h1).await {
                Ok(observed) => observed,
                Err(e) => {
                    // Expected when a test makes the client abort the handshake
                    tracing::warn!("mock server connection failed: {}", e);
                    Observed::default()
                }
            }
        })
    }
}

async fn serve(
    mut stream: TcpStream,
    config: Arc<ServerConfig>,
    body: &'static [u8],
    raw_h1: Option<RawH1>,
) -> io::Result<Observed> {
    let mut observed = Observed {
        client_hello: read_record(&mut stream).await?,
        ..Observed::default()
    };

    let replay = Replay {
        prefix: observed.client_hello.clone(),
        pos: 0,
        inner: stream,
    };
    let mut tls = TlsAcceptor::from(config).accept(replay).await?;
    observed.alpn = tls.get_ref().1.alpn_protocol().map(|p| p.to_vec());

    if observed.alpn.as_deref() == Some(b"h2") {
        let mut conn = h2::server::handshake(tls)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        while let Some(Ok((request, mut respond))) = conn.accept().await {
            observed.requests += 1;
            observed.request = request.uri().path().to_string();
            let response = http::Response::builder()
                .status(200)
                .header("content-type", "text/plain")
                .body(())
                .expect("valid response");
            let mut send = respond
                .send_response(response, false)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            send.send_data(Bytes::from_static(body), true)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        }
        return Ok(observed);
    }

    let mut head = Vec::new();
    let mut buf = [0u8; 4096];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = timeout(Duration::from_secs(5), tls.read(&mut buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "request timeout"))??;
        if n == 0 {
            return Ok(observed);
        }
        head.extend_from_slice(&buf[..n]);
    }
    observed.requests = 1;
    observed.request = String::from_utf8_lossy(&head).into_owned();

    if let Some(raw) = raw_h1 {
        tls.write_all(raw.response).await?;
        tls.flush().await?;
        if raw.close_notify {
            tls.shutdown().await?;
        }
        return Ok(observed);
    }

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    tls.write_all(response.as_bytes()).await?;
    tls.write_all(body).await?;
    tls.shutdown().await?;
    Ok(observed)
}

/// Read exactly one TLS record off the socket.
async fn read_record(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut record = vec![0u8; 5];
    stream.read_exact(&mut record).await?;
    let len = u16::from_be_bytes([record[3], record[4]]) as usize;
    record.resize(5 + len, 0);
    stream.read_exact(&mut record[5..]).await?;
    Ok(record)
}

/// Feeds already-consumed bytes back to the TLS acceptor before the socket.
struct Replay {
    prefix: Vec<u8>,
    pos: usize,
    inner: TcpStream,
}

impl AsyncRead for Replay {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.pos < this.prefix.len() {
            let n = buf.remaining().min(this.prefix.len() - this.pos);
            buf.put_slice(&this.prefix[this.pos..this.pos + n]);
            this.pos += n;
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for Replay {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
