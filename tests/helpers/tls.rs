use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;

/// Generate a self-signed certificate for localhost/127.0.0.1 and return a
/// server config offering `alpn`, plus the certificate DER to trust.
pub fn generate_cert_bundle(alpn: &[&[u8]]) -> (Arc<ServerConfig>, Vec<u8>) {
    let subject_alt_names = vec!["127.0.0.1".to_string(), "localhost".to_string()];

    let cert =
        rcgen::generate_simple_self_signed(subject_alt_names).expect("Failed to generate cert");
    let cert_der: CertificateDer<'static> = cert.cert.der().clone();
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.signing_key.serialize_der()));

    let mut config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .expect("Failed to select protocol versions")
    .with_no_client_auth()
    .with_single_cert(vec![cert_der.clone()], key_der)
    .expect("Failed to set certificate");

    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();

    // Self-signed, so the leaf is its own root
    (Arc::new(config), cert_der.to_vec())
}
