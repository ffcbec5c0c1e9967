//! # specter-probe
//!
//! Single-shot TLS probe with ClientHello control.
//!
//! One run dials an IP, performs a TLS handshake with a shaped ClientHello
//! (fixed or caller-chosen client random, optional pause after the
//! ClientHello), and sends one `GET` over whatever ALPN negotiated: HTTP/2
//! through hyper, HTTP/1.1 framed directly on the stream.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod headers;
pub mod probe;
pub mod response;

// ClientHello and HTTP/2 shaping
pub mod fingerprint;

// TCP, TLS and HTTP transports
pub mod transport;

// Re-exports
pub use config::{ConnectionTarget, HandshakeConfig, ProbeConfig, RequestSpec, TrustPolicy};
pub use error::{Error, Result};
pub use headers::RequestHeaders;
pub use response::{ProbeReport, ProbeResult};
pub use transport::{EstablishedChannel, HandshakeInfo, NegotiatedProtocol};
