//! ClientHello shaping: cipher-suite order, key-exchange groups, ALPN offer.
//!
//! The shape is applied to a rustls `CryptoProvider` before the client
//! config is built. rustls itself permutes extension order per connection,
//! so the suite and group lists are the parts we control here.

use rand::seq::SliceRandom;
use rand::Rng;
use rustls::crypto::CryptoProvider;
use rustls::{CipherSuite, NamedGroup, SupportedCipherSuite};

use super::profiles::HelloMode;
use crate::error::{Error, Result};

/// ALPN protocols offered, in preference order.
pub const ALPN_PROTOCOLS: &[&[u8]] = &[b"h2", b"http/1.1"];

/// Chrome 131 cipher suites in exact order (CBC and static-RSA suites that
/// rustls does not implement are skipped when the shape is applied).
pub const CHROME_131_CIPHER_SUITES: &[CipherSuite] = &[
    CipherSuite::TLS13_AES_128_GCM_SHA256,
    CipherSuite::TLS13_AES_256_GCM_SHA384,
    CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA,
    CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
    CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA,
];

/// Chrome 131 supported groups.
pub const CHROME_131_GROUPS: &[NamedGroup] =
    &[NamedGroup::X25519, NamedGroup::secp256r1, NamedGroup::secp384r1];

/// Ordered cipher suites and groups for one ClientHello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloShape {
    pub cipher_suites: Vec<CipherSuite>,
    pub kx_groups: Vec<NamedGroup>,
}

impl HelloShape {
    /// Shape for `mode`, drawing randomness from the thread RNG.
    pub fn for_mode(mode: HelloMode, provider: &CryptoProvider) -> Self {
        match mode {
            HelloMode::Randomized => Self::randomized(provider, &mut rand::thread_rng()),
            HelloMode::Chrome => Self::chrome(),
            HelloMode::Native => Self::native(provider),
        }
    }

    /// The provider's own order.
    pub fn native(provider: &CryptoProvider) -> Self {
        Self {
            cipher_suites: provider.cipher_suites.iter().map(|s| s.suite()).collect(),
            kx_groups: provider.kx_groups.iter().map(|g| g.name()).collect(),
        }
    }

    /// Chrome 131 order.
    pub fn chrome() -> Self {
        Self {
            cipher_suites: CHROME_131_CIPHER_SUITES.to_vec(),
            kx_groups: CHROME_131_GROUPS.to_vec(),
        }
    }

    /// Random order and subset.
    ///
    /// TLS 1.3 suites are all kept and shuffled. TLS 1.2 suites are shuffled
    /// and a random non-empty prefix is kept. TLS 1.3 suites always come
    /// first, as every mainstream client sends them. Groups are shuffled;
    /// the first one receives the key share.
    pub fn randomized<R: Rng + ?Sized>(provider: &CryptoProvider, rng: &mut R) -> Self {
        let (mut tls13, mut tls12): (Vec<&SupportedCipherSuite>, Vec<&SupportedCipherSuite>) =
            provider
                .cipher_suites
                .iter()
                .partition(|s| s.tls13().is_some());

        tls13.shuffle(rng);
        tls12.shuffle(rng);
        if !tls12.is_empty() {
            let keep = rng.gen_range(1..=tls12.len());
            tls12.truncate(keep);
        }

        let mut kx_groups: Vec<NamedGroup> = provider.kx_groups.iter().map(|g| g.name()).collect();
        kx_groups.shuffle(rng);

        Self {
            cipher_suites: tls13.into_iter().chain(tls12).map(|s| s.suite()).collect(),
            kx_groups,
        }
    }

    /// Reorder and filter `provider` to this shape.
    ///
    /// Entries the provider does not implement are skipped. Fails when
    /// nothing usable is left.
    pub fn apply(&self, mut provider: CryptoProvider) -> Result<CryptoProvider> {
        provider.cipher_suites = self
            .cipher_suites
            .iter()
            .filter_map(|want| {
                provider
                    .cipher_suites
                    .iter()
                    .find(|have| have.suite() == *want)
                    .copied()
            })
            .collect();

        provider.kx_groups = self
            .kx_groups
            .iter()
            .filter_map(|want| {
                provider
                    .kx_groups
                    .iter()
                    .find(|have| have.name() == *want)
                    .copied()
            })
            .collect();

        if provider.cipher_suites.is_empty() {
            return Err(Error::handshake_build(
                "no supported cipher suites left for this ClientHello shape",
            ));
        }
        if provider.kx_groups.is_empty() {
            return Err(Error::handshake_build(
                "no supported key exchange groups left for this ClientHello shape",
            ));
        }

        Ok(provider)
    }
}

/// ALPN offer as owned protocol names.
pub fn alpn_protocols() -> Vec<Vec<u8>> {
    ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rustls::crypto::ring::default_provider;

    fn is_tls13(suite: &CipherSuite) -> bool {
        matches!(
            suite,
            CipherSuite::TLS13_AES_128_GCM_SHA256
                | CipherSuite::TLS13_AES_256_GCM_SHA384
                | CipherSuite::TLS13_CHACHA20_POLY1305_SHA256
        )
    }

    #[test]
    fn test_randomized_keeps_tls13_first_and_nonempty() {
        let provider = default_provider();
        for seed in 0..64 {
            let shape = HelloShape::randomized(&provider, &mut StdRng::seed_from_u64(seed));
            assert!(!shape.cipher_suites.is_empty());
            assert_eq!(shape.kx_groups.len(), provider.kx_groups.len());

            let first_tls12 = shape.cipher_suites.iter().position(|s| !is_tls13(s));
            if let Some(idx) = first_tls12 {
                assert!(shape.cipher_suites[idx..].iter().all(|s| !is_tls13(s)));
            }
            assert_eq!(shape.cipher_suites.iter().filter(|s| is_tls13(s)).count(), 3);
        }
    }

    #[test]
    fn test_randomized_varies_between_runs() {
        let provider = default_provider();
        let shapes: Vec<HelloShape> = (0..32)
            .map(|seed| HelloShape::randomized(&provider, &mut StdRng::seed_from_u64(seed)))
            .collect();
        assert!(shapes.iter().any(|s| *s != shapes[0]));
    }

    #[test]
    fn test_randomized_is_reproducible_for_a_seed() {
        let provider = default_provider();
        let a = HelloShape::randomized(&provider, &mut StdRng::seed_from_u64(7));
        let b = HelloShape::randomized(&provider, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_chrome_shape_skips_unsupported_suites() {
        let shaped = HelloShape::chrome().apply(default_provider()).unwrap();
        let suites: Vec<CipherSuite> = shaped.cipher_suites.iter().map(|s| s.suite()).collect();
        assert_eq!(suites[0], CipherSuite::TLS13_AES_128_GCM_SHA256);
        assert!(!suites.contains(&CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA));
        assert_eq!(shaped.kx_groups[0].name(), NamedGroup::X25519);
    }

    #[test]
    fn test_native_shape_is_identity() {
        let provider = default_provider();
        let before: Vec<CipherSuite> = provider.cipher_suites.iter().map(|s| s.suite()).collect();
        let shaped = HelloShape::native(&provider).apply(default_provider()).unwrap();
        let after: Vec<CipherSuite> = shaped.cipher_suites.iter().map(|s| s.suite()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_apply_fails_when_nothing_usable() {
        let shape = HelloShape {
            cipher_suites: vec![CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA],
            kx_groups: CHROME_131_GROUPS.to_vec(),
        };
        let err = shape.apply(default_provider()).unwrap_err();
        assert!(matches!(err, Error::HandshakeBuild(_)));

        let shape = HelloShape {
            cipher_suites: CHROME_131_CIPHER_SUITES.to_vec(),
            kx_groups: vec![NamedGroup::FFDHE2048],
        };
        assert!(shape.apply(default_provider()).is_err());
    }

    #[test]
    fn test_alpn_offer() {
        assert_eq!(alpn_protocols(), vec![b"h2".to_vec(), b"http/1.1".to_vec()]);
    }
}
