//! Error types for specter-probe.

use std::io;
use std::net::SocketAddr;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can end a probe run.
///
/// Every variant is terminal: the probe never retries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed input, detected before any I/O.
    #[error("Invalid input: {0}")]
    Input(String),

    /// TCP dial failure.
    #[error("Failed to connect to {addr}: {source}")]
    Connection {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The ClientHello could not be assembled for the requested mode.
    #[error("Failed to build handshake: {0}")]
    HandshakeBuild(String),

    /// TLS handshake failure (protocol violation, rejected parameters, EOF).
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    /// ALPN produced a protocol we have no transport for.
    #[error("Unsupported application protocol negotiated: {0:?}")]
    UnsupportedProtocol(String),

    /// Failure while building or writing the request.
    #[error("Request error: {0}")]
    Request(String),

    /// Failure while reading or parsing the response.
    #[error("Response parse error: {0}")]
    ResponseParse(String),
}

impl Error {
    /// Create an input error.
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    /// Create a connection error for the given address.
    pub fn connection(addr: SocketAddr, source: io::Error) -> Self {
        Self::Connection { addr, source }
    }

    /// Create a handshake construction error.
    pub fn handshake_build(message: impl Into<String>) -> Self {
        Self::HandshakeBuild(message.into())
    }

    /// Create a handshake error.
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake(message.into())
    }

    /// Create a request error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(message.into())
    }

    /// Create a response parse error.
    pub fn response_parse(message: impl Into<String>) -> Self {
        Self::ResponseParse(message.into())
    }

    /// True for errors raised before the probe touched the network.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input(_))
    }
}
