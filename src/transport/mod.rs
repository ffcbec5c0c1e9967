//! Transport layer.
//!
//! - TCP dialing and the ClientHello-observing stream wrapper
//! - rustls connector and the handshake orchestrator
//! - HTTP/1.1 (raw framing) and HTTP/2 (hyper) exchanges

pub mod connector;
pub mod h1;
pub mod h2;
pub mod hello;
pub mod session;
pub mod tcp;

pub use connector::NegotiatedProtocol;
pub use session::{connect, EstablishedChannel, HandshakeInfo, HandshakeState, RawConnection};
