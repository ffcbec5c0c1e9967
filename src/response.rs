//! Probe results and their printed form.

use std::fmt;

use bytes::Bytes;
use http::StatusCode;

use crate::config::ConnectionTarget;
use crate::transport::connector::NegotiatedProtocol;
use crate::transport::session::HandshakeInfo;

/// The single response a probe received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub status: u16,
    /// `HTTP/1.0`, `HTTP/1.1` or `HTTP/2`.
    pub version: String,
    /// Response headers in wire order.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ProbeResult {
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body as text, invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// `HTTP/1.1 200 OK`
    pub fn status_line(&self) -> String {
        let reason = StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("");
        format!("{} {} {}", self.version, self.status, reason)
            .trim_end()
            .to_string()
    }
}

/// Everything a run reports.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub target: ConnectionTarget,
    pub protocol: NegotiatedProtocol,
    pub handshake: HandshakeInfo,
    pub response: ProbeResult,
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hs = &self.handshake;
        writeln!(
            f,
            "* connected to {} ({})",
            self.target.socket_addr(),
            self.target.server_name()
        )?;
        writeln!(
            f,
            "* TLS {} {} alpn={} hello={}",
            hs.protocol_version.as_deref().unwrap_or("?"),
            hs.cipher_suite.as_deref().unwrap_or("?"),
            self.protocol,
            hs.hello_mode
        )?;
        if let Some(random) = hs.client_random {
            writeln!(f, "* client random {}", hex::encode(random))?;
        }
        writeln!(
            f,
            "* hello sent after {:?}, handshake took {:?}",
            hs.hello_sent_after, hs.handshake_time
        )?;

        writeln!(f, "{}", self.response.status_line())?;
        for (name, value) in &self.response.headers {
            writeln!(f, "{}: {}", name, value)?;
        }
        writeln!(f)?;
        write!(f, "{}", self.response.text())
    }
}
