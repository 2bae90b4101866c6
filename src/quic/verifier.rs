//! Pinned-fingerprint certificate verifier.
//!
//! Servers use self-signed certificates; the client trusts a server iff the
//! SHA-256 digest of its end-entity certificate matches one of the
//! fingerprints from the connection configuration. There is no chain
//! building, no web PKI root set, and no hostname check: the pin is the
//! whole trust decision. Signature verification is delegated to the rustls
//! ring provider.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{DigitallySignedStruct, Error as TlsError, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use sha2::{Digest, Sha256};

use crate::core::CertificateHash;

/// Get the ring provider's supported signature verification algorithms.
fn ring_signature_algorithms() -> &'static rustls::crypto::WebPkiSupportedAlgorithms {
    use std::sync::LazyLock;
    static ALGORITHMS: LazyLock<rustls::crypto::WebPkiSupportedAlgorithms> = LazyLock::new(|| {
        rustls::crypto::ring::default_provider().signature_verification_algorithms
    });
    &ALGORITHMS
}

/// `ServerCertVerifier` accepting only pinned certificate fingerprints.
#[derive(Debug)]
pub struct PinnedCertVerifier {
    pins: Arc<[CertificateHash]>,
}

impl PinnedCertVerifier {
    /// Create a verifier trusting exactly the given fingerprints.
    pub fn new(pins: Vec<CertificateHash>) -> Self {
        Self { pins: pins.into() }
    }
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        let digest = Sha256::digest(end_entity.as_ref());
        if self.pins.iter().any(|pin| pin.matches(&digest)) {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(TlsError::General(
                "server certificate matches no pinned fingerprint".into(),
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, ring_signature_algorithms())
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, ring_signature_algorithms())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        ring_signature_algorithms().supported_schemes()
    }
}
