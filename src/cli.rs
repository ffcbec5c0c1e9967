//! Command line interface.

use std::ffi::OsString;
use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::config::{
    ConnectionTarget, HandshakeConfig, ProbeConfig, RequestSpec, TrustPolicy, DEFAULT_CLIENT_RANDOM,
};
use crate::error::{Error, Result};
use crate::fingerprint::HelloMode;
use crate::headers::RequestHeaders;

/// Long flags that may also be written with a single dash (`-ip`, `-host`).
const LONG_FLAGS: &[&str] = &[
    "ip",
    "host",
    "path",
    "delay",
    "port",
    "header",
    "hello",
    "client-random",
    "random-client-random",
    "ca-file",
    "insecure",
    "help",
    "version",
];

#[derive(Parser, Debug)]
#[command(name = "specter-probe", version, about = "Single-shot TLS probe with a randomized ClientHello", long_about = None)]
pub struct Args {
    /// IP address of the host to target
    #[arg(long)]
    pub ip: Option<String>,

    /// TLS Server Name and HTTP host to request
    #[arg(long)]
    pub host: Option<String>,

    /// HTTP path to request
    #[arg(long, default_value = "/")]
    pub path: String,

    /// Delay after the ClientHello, in seconds
    #[arg(long, default_value_t = 0)]
    pub delay: u64,

    /// TCP port to target
    #[arg(long, default_value_t = 443, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Extra header, "Name: Value" (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    pub headers: Vec<String>,

    /// ClientHello shaping
    #[arg(long, value_enum, default_value_t = HelloMode::Randomized)]
    pub hello: HelloMode,

    /// Client random as 64 hex characters
    #[arg(long, value_name = "HEX", conflicts_with = "random_client_random")]
    pub client_random: Option<String>,

    /// Keep the TLS stack's own client random
    #[arg(long, default_value_t = false)]
    pub random_client_random: bool,

    /// PEM file with the root certificates to trust
    #[arg(long, value_name = "PATH", conflicts_with = "insecure")]
    pub ca_file: Option<PathBuf>,

    /// Skip server certificate verification
    #[arg(long, default_value_t = false)]
    pub insecure: bool,
}

/// Rewrite single-dash long flags (`-ip 1.2.3.4`, `-delay=3`) to `--` form.
///
/// Everything after a bare `--` is left alone.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut passthrough = false;
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            if passthrough {
                return arg;
            }
            let Some(text) = arg.to_str() else {
                return arg;
            };
            if text == "--" {
                passthrough = true;
                return arg;
            }
            match text.strip_prefix('-') {
                Some(rest) if !rest.starts_with('-') => {
                    let name = rest.split('=').next().unwrap_or_default();
                    if LONG_FLAGS.contains(&name) {
                        OsString::from(format!("-{}", text))
                    } else {
                        arg
                    }
                }
                _ => arg,
            }
        })
        .collect()
}

impl Args {
    /// Parse from `argv`, accepting single-dash long flags.
    pub fn try_parse_normalized<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::try_parse_from(normalize_args(args))
    }

    /// Validate everything and build the run configuration.
    ///
    /// Headers are checked first, then the required target flags. Nothing
    /// here touches the network.
    pub fn into_config(self) -> Result<ProbeConfig> {
        let headers = RequestHeaders::parse_all(&self.headers)?;

        let (ip, host) = match (self.ip.as_deref(), self.host.as_deref()) {
            (Some(ip), Some(host)) if !ip.is_empty() && !host.is_empty() => (ip, host),
            _ => return Err(Error::input("must provide ip and host")),
        };
        let ip: IpAddr = ip
            .parse()
            .map_err(|_| Error::input(format!("invalid ip address {:?}", ip)))?;
        let target = ConnectionTarget::new(ip, self.port, host, self.path.as_str())?;

        let client_random = if self.random_client_random {
            None
        } else {
            match self.client_random.as_deref() {
                Some(hex) => Some(parse_client_random(hex)?),
                None => Some(DEFAULT_CLIENT_RANDOM),
            }
        };

        let trust = match (self.ca_file, self.insecure) {
            (Some(path), _) => TrustPolicy::CaFile(path),
            (None, true) => TrustPolicy::Insecure,
            (None, false) => TrustPolicy::WebPki,
        };

        let handshake = HandshakeConfig {
            client_random,
            hello_mode: self.hello,
            trust,
            ..HandshakeConfig::default()
        }
        .with_delay_secs(self.delay);

        Ok(ProbeConfig {
            target,
            request: RequestSpec::new(headers),
            handshake,
        })
    }
}

fn parse_client_random(input: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(input.trim())
        .map_err(|e| Error::input(format!("invalid client random: {}", e)))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| Error::input(format!("client random must be 32 bytes, got {}", b.len())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_normalized(std::iter::once("specter-probe").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_single_dash_long_flags() {
        let args = parse(&[
            "-ip", "10.0.0.1", "-host", "example.com", "-path", "/x", "-delay=2", "-port", "8443",
            "-H", "X-Test: abc", "-H", "Accept: */*",
        ]);
        assert_eq!(args.ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(args.host.as_deref(), Some("example.com"));
        assert_eq!(args.delay, 2);
        assert_eq!(args.port, 8443);
        assert_eq!(args.headers, vec!["X-Test: abc", "Accept: */*"]);
    }

    #[test]
    fn test_normalize_leaves_values_alone() {
        let out = normalize_args(["bin", "-H", "-ip: odd", "--", "-host"]);
        assert_eq!(out, vec!["bin", "-H", "-ip: odd", "--", "-host"]);
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--ip", "127.0.0.1", "--host", "localhost"]).into_config().unwrap();
        assert_eq!(config.target.port(), 443);
        assert_eq!(config.target.path(), "/");
        assert_eq!(config.handshake.client_random, Some(DEFAULT_CLIENT_RANDOM));
        assert_eq!(config.handshake.post_hello_delay, Duration::ZERO);
        assert_eq!(config.handshake.hello_mode, HelloMode::Randomized);
        assert_eq!(config.handshake.trust, TrustPolicy::WebPki);
        assert!(config.request.headers.is_empty());
    }

    #[test]
    fn test_missing_ip_or_host() {
        let err = parse(&["-host", "example.com"]).into_config().unwrap_err();
        assert!(err.is_input());
        let err = parse(&["-ip", "127.0.0.1"]).into_config().unwrap_err();
        assert!(err.is_input());
    }

    #[test]
    fn test_bad_header_fails_before_target_checks() {
        let err = parse(&["-H", "badheader"]).into_config().unwrap_err();
        assert!(err.to_string().contains("badheader"));
    }

    #[test]
    fn test_invalid_ip() {
        let err = parse(&["-ip", "not-an-ip", "-host", "x"]).into_config().unwrap_err();
        assert!(err.is_input());
    }

    #[test]
    fn test_client_random_flags() {
        let hex = "00".repeat(31) + "ff";
        let config = parse(&["-ip", "::1", "-host", "h", "-client-random", hex.as_str()])
            .into_config()
            .unwrap();
        let mut expected = [0u8; 32];
        expected[31] = 0xff;
        assert_eq!(config.handshake.client_random, Some(expected));

        let config = parse(&["-ip", "::1", "-host", "h", "-random-client-random"])
            .into_config()
            .unwrap();
        assert_eq!(config.handshake.client_random, None);

        let err = parse(&["-ip", "::1", "-host", "h", "-client-random", "abcd"])
            .into_config()
            .unwrap_err();
        assert!(err.is_input());
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        let hex = "00".repeat(32);
        assert!(Args::try_parse_normalized([
            "bin", "-client-random", hex.as_str(), "-random-client-random"
        ])
        .is_err());
        assert!(Args::try_parse_normalized(["bin", "-ca-file", "ca.pem", "-insecure"]).is_err());
    }

    #[test]
    fn test_port_zero_rejected() {
        assert!(Args::try_parse_normalized(["bin", "-port", "0"]).is_err());
    }

    #[test]
    fn test_trust_flags() {
        let config = parse(&["-ip", "1.1.1.1", "-host", "h", "-insecure"]).into_config().unwrap();
        assert_eq!(config.handshake.trust, TrustPolicy::Insecure);
        let config = parse(&["-ip", "1.1.1.1", "-host", "h", "-ca-file", "/tmp/ca.pem"])
            .into_config()
            .unwrap();
        assert_eq!(config.handshake.trust, TrustPolicy::CaFile("/tmp/ca.pem".into()));
    }
}
