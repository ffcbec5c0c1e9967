//! Immutable probe configuration, built once at startup.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use http::Method;

use crate::error::{Error, Result};
use crate::fingerprint::HelloMode;
use crate::headers::RequestHeaders;

/// Client random used when the caller does not supply one: bytes 100..=131.
pub const DEFAULT_CLIENT_RANDOM: [u8; 32] = {
    let mut random = [0u8; 32];
    let mut i = 0;
    while i < 32 {
        random[i] = 100 + i as u8;
        i += 1;
    }
    random
};

/// Where the probe connects and what it asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    ip: IpAddr,
    port: u16,
    server_name: String,
    path: String,
}

impl ConnectionTarget {
    /// Validate and build a target. A path without a leading `/` gets one.
    pub fn new(
        ip: IpAddr,
        port: u16,
        server_name: impl Into<String>,
        path: impl Into<String>,
    ) -> Result<Self> {
        let server_name = server_name.into();
        if server_name.trim().is_empty() {
            return Err(Error::input("TLS server name must not be empty"));
        }
        if port == 0 {
            return Err(Error::input("port must be in 1..=65535"));
        }

        let mut path = path.into();
        if path.is_empty() || !path.starts_with('/') {
            path.insert(0, '/');
        }
        if path.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
            return Err(Error::input(format!("invalid request path {:?}", path)));
        }

        Ok(Self {
            ip,
            port,
            server_name,
            path,
        })
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// TLS Server Name, also used as the HTTP Host / `:authority`.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// The single request a probe sends.
#[derive(Debug, Clone, Default)]
pub struct RequestSpec {
    pub headers: RequestHeaders,
}

impl RequestSpec {
    pub fn new(headers: RequestHeaders) -> Self {
        Self { headers }
    }

    /// Always GET; the probe never sends a body.
    pub fn method(&self) -> Method {
        Method::GET
    }
}

/// How the server certificate is checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TrustPolicy {
    /// Bundled Mozilla root set.
    #[default]
    WebPki,
    /// Roots loaded from a PEM file.
    CaFile(PathBuf),
    /// Roots given as DER certificates (used by embedders and tests).
    Roots(Vec<Vec<u8>>),
    /// No verification at all.
    Insecure,
}

/// Handshake parameters. Fixed for the whole run.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// `None` keeps the TLS stack's own random.
    pub client_random: Option<[u8; 32]>,
    pub post_hello_delay: Duration,
    pub hello_mode: HelloMode,
    pub trust: TrustPolicy,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            client_random: Some(DEFAULT_CLIENT_RANDOM),
            post_hello_delay: Duration::ZERO,
            hello_mode: HelloMode::default(),
            trust: TrustPolicy::default(),
        }
    }
}

impl HandshakeConfig {
    /// Delay given in whole seconds, as on the command line.
    pub fn with_delay_secs(mut self, secs: u64) -> Self {
        self.post_hello_delay = Duration::from_secs(secs);
        self
    }
}

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub target: ConnectionTarget,
    pub request: RequestSpec,
    pub handshake: HandshakeConfig,
}
