//! rustls TLS connector: client config, trust, fixed client random.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::Resumption;
use rustls::crypto::{
    verify_tls12_signature, verify_tls13_signature, CryptoProvider, GetRandomFailed, SecureRandom,
    WebPkiSupportedAlgorithms,
};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::config::TrustPolicy;
use crate::error::{Error, Result};
use crate::fingerprint::tls::alpn_protocols;

/// Negotiated ALPN protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiatedProtocol {
    /// HTTP/2 ("h2")
    H2,
    /// HTTP/1.1 ("http/1.1")
    Http11,
    /// Server did not answer the ALPN extension
    Absent,
    /// Anything else the server selected
    Other(String),
}

impl NegotiatedProtocol {
    /// Map the raw ALPN selection reported after the handshake.
    pub fn from_alpn(alpn: Option<&[u8]>) -> Self {
        match alpn {
            None | Some(b"") => Self::Absent,
            Some(b"h2") => Self::H2,
            Some(b"http/1.1") => Self::Http11,
            Some(other) => Self::Other(String::from_utf8_lossy(other).into_owned()),
        }
    }

    /// The wire tag; `""` when nothing was negotiated.
    pub fn tag(&self) -> &str {
        match self {
            Self::H2 => "h2",
            Self::Http11 => "http/1.1",
            Self::Absent => "",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for NegotiatedProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("(none)"),
            other => f.write_str(other.tag()),
        }
    }
}

/// Crypto provider the ClientHello shape is applied to.
pub fn base_provider() -> CryptoProvider {
    rustls::crypto::ring::default_provider()
}

/// Random source that answers every 32-byte request with a fixed value.
///
/// In a rustls client the only 32-byte draws are the ClientHello random and
/// the legacy session id, so both become the fixed value. Everything else
/// (extension order seed, key shares) still comes from the real RNG.
struct FixedHelloRandom {
    random: [u8; 32],
    fallback: &'static dyn SecureRandom,
}

impl fmt::Debug for FixedHelloRandom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedHelloRandom")
            .field("random", &hex::encode(self.random))
            .finish()
    }
}

impl SecureRandom for FixedHelloRandom {
    fn fill(&self, buf: &mut [u8]) -> std::result::Result<(), GetRandomFailed> {
        if buf.len() == self.random.len() {
            buf.copy_from_slice(&self.random);
            Ok(())
        } else {
            self.fallback.fill(buf)
        }
    }
}

/// Server certificate check, resolved from a [`TrustPolicy`].
#[derive(Clone)]
pub enum ServerTrust {
    Roots(Arc<RootCertStore>),
    Insecure,
}

impl fmt::Debug for ServerTrust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Roots(roots) => write!(f, "Roots({} anchors)", roots.len()),
            Self::Insecure => f.write_str("Insecure"),
        }
    }
}

impl ServerTrust {
    /// Load the roots named by `policy`.
    pub fn load(policy: &TrustPolicy) -> Result<Self> {
        match policy {
            TrustPolicy::WebPki => {
                let mut roots = RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                Ok(Self::Roots(Arc::new(roots)))
            }
            TrustPolicy::CaFile(path) => {
                let file = File::open(path).map_err(|e| {
                    Error::handshake_build(format!("Failed to open CA file {}: {}", path.display(), e))
                })?;
                let certs = rustls_pemfile::certs(&mut BufReader::new(file))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| {
                        Error::handshake_build(format!("Failed to read CA file {}: {}", path.display(), e))
                    })?;
                Self::from_certs(certs)
            }
            TrustPolicy::Roots(ders) => {
                Self::from_certs(ders.iter().map(|der| CertificateDer::from(der.clone())).collect())
            }
            TrustPolicy::Insecure => Ok(Self::Insecure),
        }
    }

    fn from_certs(certs: Vec<CertificateDer<'static>>) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(certs);
        if ignored > 0 {
            tracing::warn!(ignored, "Ignored unparsable root certificates");
        }
        if added == 0 {
            return Err(Error::handshake_build("no usable root certificates"));
        }
        Ok(Self::Roots(Arc::new(roots)))
    }
}

/// Accepts any certificate but still checks handshake signatures.
#[derive(Debug)]
struct NoCertificateVerification {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Build the client config for one handshake.
///
/// `client_random`, when set, replaces the ClientHello random. That removes
/// the per-connection randomness TLS key derivation normally gets from the
/// client; it exists for reproducible diagnostics only.
pub fn client_config(
    mut provider: CryptoProvider,
    client_random: Option<[u8; 32]>,
    trust: &ServerTrust,
) -> Result<ClientConfig> {
    if let Some(random) = client_random {
        // rustls wants a 'static source; one per handshake
        let fixed: &'static FixedHelloRandom = Box::leak(Box::new(FixedHelloRandom {
            random,
            fallback: provider.secure_random,
        }));
        provider.secure_random = fixed;
    }

    let algorithms = provider.signature_verification_algorithms;
    let builder = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::handshake_build(format!("Invalid TLS configuration: {}", e)))?;

    let mut config = match trust {
        ServerTrust::Roots(roots) => builder
            .with_root_certificates(Arc::clone(roots))
            .with_no_client_auth(),
        ServerTrust::Insecure => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertificateVerification { algorithms }))
            .with_no_client_auth(),
    };

    config.alpn_protocols = alpn_protocols();
    // No cached session may leak into the ClientHello
    config.resumption = Resumption::disabled();

    Ok(config)
}

/// Check that `provider` yields a usable config without building the final one.
pub fn validate_provider(provider: &CryptoProvider) -> Result<()> {
    ClientConfig::builder_with_provider(Arc::new(provider.clone()))
        .with_safe_default_protocol_versions()
        .map(|_| ())
        .map_err(|e| Error::handshake_build(format!("Invalid TLS configuration: {}", e)))
}

/// Resolve the TLS Server Name sent in SNI.
pub fn server_name(name: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(name.to_string())
        .map_err(|e| Error::handshake_build(format!("Invalid server name {:?}: {}", name, e)))
}
