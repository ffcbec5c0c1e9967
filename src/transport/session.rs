//! TLS session orchestration.
//!
//! The handshake is driven through three owned states:
//!
//! ```text
//! connect() -> RawConnection --build_handshake()--> HandshakeState --handshake()--> EstablishedChannel
//!                                                    | override_client_random()
//!                                                    | set_post_hello_delay()
//! ```
//!
//! Each transition consumes the previous state, so the ClientHello cannot be
//! mutated once the handshake has started and nothing can be mutated before
//! the handshake has been built. Dropping any state closes the socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::crypto::CryptoProvider;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::config::{ConnectionTarget, HandshakeConfig};
use crate::error::{Error, Result};
use crate::fingerprint::{HelloMode, HelloShape};
use crate::transport::connector::{self, NegotiatedProtocol, ServerTrust};
use crate::transport::hello::HelloStream;
use crate::transport::tcp;

/// Stream type of a channel established by [`HandshakeState::handshake`].
pub type TlsChannelStream = TlsStream<HelloStream<TcpStream>>;

/// Open TCP connection, no TLS yet.
#[derive(Debug)]
pub struct RawConnection {
    stream: TcpStream,
    peer: SocketAddr,
    server_name: String,
    opened_at: Instant,
}

/// Dial the target.
pub async fn connect(target: &ConnectionTarget) -> Result<RawConnection> {
    let peer = target.socket_addr();
    let stream = tcp::dial(peer).await?;
    Ok(RawConnection {
        stream,
        peer,
        server_name: target.server_name().to_string(),
        opened_at: Instant::now(),
    })
}

impl RawConnection {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Prepare a ClientHello for this connection and the target's Server Name.
    ///
    /// The client random and delay start out as "stack random" and "none";
    /// set them on the returned state.
    pub fn build_handshake(self, cfg: &HandshakeConfig) -> Result<HandshakeState> {
        let base = connector::base_provider();
        let shape = HelloShape::for_mode(cfg.hello_mode, &base);
        let provider = shape.apply(base)?;
        connector::validate_provider(&provider)?;

        let server_name = connector::server_name(&self.server_name)?;
        let trust = ServerTrust::load(&cfg.trust)?;

        tracing::debug!(
            mode = %cfg.hello_mode,
            cipher_suites = ?shape.cipher_suites,
            kx_groups = ?shape.kx_groups,
            "ClientHello shaped"
        );

        Ok(HandshakeState {
            conn: self,
            server_name,
            provider,
            trust,
            mode: cfg.hello_mode,
            client_random: None,
            post_hello_delay: Duration::ZERO,
        })
    }
}

/// A built, not yet started handshake.
#[derive(Debug)]
pub struct HandshakeState {
    conn: RawConnection,
    server_name: ServerName<'static>,
    provider: CryptoProvider,
    trust: ServerTrust,
    mode: HelloMode,
    client_random: Option<[u8; 32]>,
    post_hello_delay: Duration,
}

impl HandshakeState {
    /// Replace the ClientHello random with `random`.
    ///
    /// Gives reproducible ClientHellos at the cost of the randomness TLS key
    /// derivation expects from the client. Diagnostic use only.
    pub fn override_client_random(&mut self, random: [u8; 32]) {
        self.client_random = Some(random);
    }

    /// Pause this long after the ClientHello is sent, before reading the
    /// server's first flight. Zero disables the pause.
    pub fn set_post_hello_delay(&mut self, delay: Duration) {
        self.post_hello_delay = delay;
    }

    pub fn client_random(&self) -> Option<[u8; 32]> {
        self.client_random
    }

    pub fn post_hello_delay(&self) -> Duration {
        self.post_hello_delay
    }

    /// Run the handshake and report the ALPN result.
    pub async fn handshake(self) -> Result<EstablishedChannel<TlsChannelStream>> {
        let config = connector::client_config(self.provider, self.client_random, &self.trust)?;
        let tls = TlsConnector::from(Arc::new(config));
        let stream = HelloStream::new(self.conn.stream, self.post_hello_delay);

        let started = Instant::now();
        let stream = tls
            .connect(self.server_name, stream)
            .await
            .map_err(|e| Error::handshake(e.to_string()))?;
        let completed = Instant::now();

        let (hello, session) = stream.get_ref();
        let protocol = NegotiatedProtocol::from_alpn(session.alpn_protocol());
        let hello_sent_at = hello.hello_sent_at().unwrap_or(started);

        let info = HandshakeInfo {
            hello_mode: self.mode,
            protocol_version: session.protocol_version().map(|v| format!("{:?}", v)),
            cipher_suite: session
                .negotiated_cipher_suite()
                .map(|s| format!("{:?}", s.suite())),
            client_random: hello.client_random(),
            hello_sent_after: hello_sent_at.saturating_duration_since(self.conn.opened_at),
            handshake_time: completed.saturating_duration_since(hello_sent_at),
        };

        tracing::debug!(
            peer = %self.conn.peer,
            alpn = %protocol,
            version = ?info.protocol_version,
            cipher = ?info.cipher_suite,
            handshake_time = ?info.handshake_time,
            "TLS handshake complete"
        );

        Ok(EstablishedChannel::new(stream, protocol, info))
    }
}

/// Facts about a completed handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeInfo {
    pub hello_mode: HelloMode,
    pub protocol_version: Option<String>,
    pub cipher_suite: Option<String>,
    /// Random observed in the ClientHello that was actually sent.
    pub client_random: Option<[u8; 32]>,
    /// TCP connect to ClientHello sent.
    pub hello_sent_after: Duration,
    /// ClientHello sent to handshake complete, including any induced delay.
    pub handshake_time: Duration,
}

/// Encrypted byte stream labeled with its negotiated protocol.
#[derive(Debug)]
pub struct EstablishedChannel<S> {
    stream: S,
    protocol: NegotiatedProtocol,
    info: HandshakeInfo,
}

impl<S> EstablishedChannel<S> {
    pub fn new(stream: S, protocol: NegotiatedProtocol, info: HandshakeInfo) -> Self {
        Self {
            stream,
            protocol,
            info,
        }
    }

    pub fn protocol(&self) -> &NegotiatedProtocol {
        &self.protocol
    }

    pub fn info(&self) -> &HandshakeInfo {
        &self.info
    }

    pub fn into_parts(self) -> (S, NegotiatedProtocol, HandshakeInfo) {
        (self.stream, self.protocol, self.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrustPolicy;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::net::TcpListener;

    async fn raw_connection(server_name: &str) -> (RawConnection, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let target =
            ConnectionTarget::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port, server_name, "/").unwrap();
        (connect(&target).await.unwrap(), listener)
    }

    #[tokio::test]
    async fn test_build_handshake_defaults() {
        let (raw, _listener) = raw_connection("example.com").await;
        let cfg = HandshakeConfig {
            trust: TrustPolicy::Insecure,
            ..HandshakeConfig::default()
        };
        let mut state = raw.build_handshake(&cfg).unwrap();
        assert_eq!(state.client_random(), None);
        assert_eq!(state.post_hello_delay(), Duration::ZERO);

        state.override_client_random([42u8; 32]);
        state.set_post_hello_delay(Duration::from_secs(1));
        assert_eq!(state.client_random(), Some([42u8; 32]));
        assert_eq!(state.post_hello_delay(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_build_handshake_rejects_invalid_server_name() {
        let (raw, _listener) = raw_connection("not a hostname").await;
        let err = raw.build_handshake(&HandshakeConfig::default()).unwrap_err();
        assert!(matches!(err, Error::HandshakeBuild(_)));
    }

    #[tokio::test]
    async fn test_handshake_against_closed_socket_fails() {
        let (raw, listener) = raw_connection("example.com").await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let cfg = HandshakeConfig {
            trust: TrustPolicy::Insecure,
            ..HandshakeConfig::default()
        };
        let state = raw.build_handshake(&cfg).unwrap();
        let err = state.handshake().await.unwrap_err();
        assert!(matches!(err, Error::Handshake(_)));
        server.await.unwrap();
    }
}
