//! TLS and HTTP/2 fingerprint configuration.

pub mod http2;
pub mod profiles;
pub mod tls;

pub use http2::Http2Settings;
pub use profiles::HelloMode;
pub use tls::{HelloShape, ALPN_PROTOCOLS};
