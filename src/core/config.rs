//! Connection configuration.
//!
//! A [`TransportConfig`] is parsed and validated once at `connect` time and
//! is immutable afterwards. The JSON form mirrors the embedding contract:
//!
//! ```json
//! { "urls": ["https://game.example:4433"],
//!   "serverCertificateHashes": ["base64 sha-256", "..."] }
//! ```
//!
//! Validation is strict: an empty URL list, an undecodable certificate hash,
//! or an unknown key rejects the whole configuration instead of letting a
//! half-parsed config reach a live connection.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use super::constants::CERT_HASH_SIZE;
use super::error::ConfigError;

/// A pinned SHA-256 fingerprint of a server's end-entity certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertificateHash([u8; CERT_HASH_SIZE]);

impl CertificateHash {
    /// Create a fingerprint from raw digest bytes.
    pub fn from_bytes(bytes: [u8; CERT_HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Decode a base64-encoded SHA-256 fingerprint.
    pub fn from_base64(encoded: &str) -> Result<Self, ConfigError> {
        let raw = STANDARD
            .decode(encoded)
            .map_err(|err| ConfigError::InvalidCertificateHash(format!("{encoded}: {err}")))?;
        let bytes: [u8; CERT_HASH_SIZE] = raw.try_into().map_err(|raw: Vec<u8>| {
            ConfigError::InvalidCertificateHash(format!(
                "{encoded}: expected {CERT_HASH_SIZE} bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// The raw fingerprint bytes.
    pub fn as_bytes(&self) -> &[u8; CERT_HASH_SIZE] {
        &self.0
    }

    /// Check a computed certificate digest against this pin.
    pub fn matches(&self, digest: &[u8]) -> bool {
        self.0[..] == *digest
    }
}

/// Congestion-control preference passed through to the underlying transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CongestionHint {
    /// Whatever the transport defaults to.
    #[default]
    Default,
    /// Favor latency over raw throughput.
    LowLatency,
    /// Favor sustained throughput.
    Throughput,
}

/// Immutable per-connection configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Candidate endpoint URLs, tried in order; first success wins.
    pub urls: Vec<String>,
    /// Pinned server certificate fingerprints for self-signed trust.
    pub server_certificate_hashes: Vec<CertificateHash>,
    /// Optional congestion-control hint.
    pub congestion_hint: CongestionHint,
}

/// JSON wire form of the configuration. No other keys are recognized.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawConfig {
    urls: Vec<String>,
    #[serde(default)]
    server_certificate_hashes: Vec<String>,
    #[serde(default)]
    congestion_hint: CongestionHint,
}

impl TransportConfig {
    /// Build a configuration from a candidate URL list.
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            server_certificate_hashes: Vec::new(),
            congestion_hint: CongestionHint::default(),
        }
    }

    /// Set the pinned server certificate fingerprints.
    pub fn with_certificate_hashes(mut self, hashes: Vec<CertificateHash>) -> Self {
        self.server_certificate_hashes = hashes;
        self
    }

    /// Set the congestion-control hint.
    pub fn with_congestion_hint(mut self, hint: CongestionHint) -> Self {
        self.congestion_hint = hint;
        self
    }

    /// Parse and validate the JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(json)?;

        let mut hashes = Vec::with_capacity(raw.server_certificate_hashes.len());
        for encoded in &raw.server_certificate_hashes {
            hashes.push(CertificateHash::from_base64(encoded)?);
        }

        let config = Self {
            urls: raw.urls,
            server_certificate_hashes: hashes,
            congestion_hint: raw.congestion_hint,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check structural invariants: at least one candidate, no empty URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.urls.is_empty() {
            return Err(ConfigError::MissingUrls);
        }
        for url in &self.urls {
            if url.trim().is_empty() {
                return Err(ConfigError::InvalidUrl("empty url".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let json = r#"{
            "urls": ["https://a.example:4433", "https://b.example:4433"],
            "serverCertificateHashes": ["AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="],
            "congestionHint": "low-latency"
        }"#;
        let config = TransportConfig::from_json(json).unwrap();
        assert_eq!(config.urls.len(), 2);
        assert_eq!(config.server_certificate_hashes.len(), 1);
        assert_eq!(
            config.server_certificate_hashes[0].as_bytes(),
            &[0u8; CERT_HASH_SIZE]
        );
        assert_eq!(config.congestion_hint, CongestionHint::LowLatency);
    }

    #[test]
    fn hashes_are_optional() {
        let config = TransportConfig::from_json(r#"{"urls": ["https://a.example"]}"#).unwrap();
        assert!(config.server_certificate_hashes.is_empty());
        assert_eq!(config.congestion_hint, CongestionHint::Default);
    }

    #[test]
    fn rejects_empty_url_list() {
        let err = TransportConfig::from_json(r#"{"urls": []}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingUrls));
    }

    #[test]
    fn rejects_bad_base64() {
        let json = r#"{"urls": ["https://a.example"], "serverCertificateHashes": ["!!!"]}"#;
        let err = TransportConfig::from_json(json).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCertificateHash(_)));
    }

    #[test]
    fn rejects_wrong_digest_size() {
        // Valid base64, but only four bytes of digest.
        let json = r#"{"urls": ["https://a.example"], "serverCertificateHashes": ["AAAAAA=="]}"#;
        let err = TransportConfig::from_json(json).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCertificateHash(_)));
    }

    #[test]
    fn rejects_unknown_keys() {
        let json = r#"{"urls": ["https://a.example"], "extra": 1}"#;
        assert!(matches!(
            TransportConfig::from_json(json),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn fingerprint_matching() {
        let hash = CertificateHash::from_bytes([7u8; CERT_HASH_SIZE]);
        assert!(hash.matches(&[7u8; CERT_HASH_SIZE]));
        assert!(!hash.matches(&[8u8; CERT_HASH_SIZE]));
        assert!(!hash.matches(&[7u8; 16]));
    }
}
