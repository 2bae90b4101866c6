//! QUIC dialer and session.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use quinn::{Endpoint, RecvStream, SendStream, VarInt};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::core::{CongestionHint, DialError, SessionError, TransportConfig};
use crate::session::{Dialer, Session};

use super::ALPN_TETHER;
use super::verifier::PinnedCertVerifier;

/// Dials candidate endpoints over QUIC with pinned-fingerprint trust.
///
/// One UDP socket serves every connection the dialer opens; per-connection
/// TLS and congestion parameters are derived from the [`TransportConfig`]
/// at dial time.
pub struct QuicDialer {
    endpoint: Endpoint,
}

impl QuicDialer {
    /// Bind a client endpoint on an ephemeral UDP port.
    pub fn new() -> Result<Self, DialError> {
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        let endpoint = Endpoint::client(bind_addr)?;
        Ok(Self { endpoint })
    }

    fn client_config(config: &TransportConfig) -> Result<quinn::ClientConfig, DialError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = PinnedCertVerifier::new(config.server_certificate_hashes.clone());

        let mut tls = rustls::ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS13])
            .map_err(|err| DialError::HandshakeFailed(err.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();
        tls.alpn_protocols = vec![ALPN_TETHER.to_vec()];

        let crypto = quinn::crypto::rustls::QuicClientConfig::try_from(Arc::new(tls))
            .map_err(|err| DialError::HandshakeFailed(err.to_string()))?;
        let mut client = quinn::ClientConfig::new(Arc::new(crypto));

        let mut transport = quinn::TransportConfig::default();
        match config.congestion_hint {
            CongestionHint::Default => {}
            CongestionHint::LowLatency => {
                transport.congestion_controller_factory(Arc::new(
                    quinn::congestion::NewRenoConfig::default(),
                ));
            }
            CongestionHint::Throughput => {
                transport.congestion_controller_factory(Arc::new(
                    quinn::congestion::BbrConfig::default(),
                ));
            }
        }
        client.transport_config(Arc::new(transport));
        Ok(client)
    }
}

/// Split a candidate URL into the TLS server name and UDP port.
fn parse_endpoint(url: &str) -> Result<(String, u16), DialError> {
    let parsed = Url::parse(url).map_err(|err| DialError::InvalidUrl(format!("{url}: {err}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| DialError::InvalidUrl(format!("{url}: missing host")))?
        .to_owned();
    let port = parsed.port().unwrap_or(443);
    Ok((host, port))
}

#[async_trait]
impl Dialer for QuicDialer {
    type Session = QuicSession;

    async fn dial(&self, url: &str, config: &TransportConfig) -> Result<QuicSession, DialError> {
        let (host, port) = parse_endpoint(url)?;

        let addr = tokio::net::lookup_host((host.as_str(), port))
            .await?
            .next()
            .ok_or_else(|| DialError::Unreachable(format!("{host}:{port}: no addresses")))?;
        debug!(%url, %addr, "dialing");

        let connecting = self
            .endpoint
            .connect_with(Self::client_config(config)?, addr, &host)
            .map_err(|err| DialError::HandshakeFailed(err.to_string()))?;
        let conn = connecting
            .await
            .map_err(|err| DialError::HandshakeFailed(err.to_string()))?;

        // The reliable channel: one bidirectional stream for the life of the
        // session. Opening is lazy in QUIC; the peer sees it on first write.
        let (send, recv) = conn
            .open_bi()
            .await
            .map_err(|err| DialError::HandshakeFailed(err.to_string()))?;

        debug!(%url, "session established");
        Ok(QuicSession {
            conn,
            send: Mutex::new(send),
            recv: Mutex::new(recv),
        })
    }
}

/// An established QUIC session: native datagrams plus one ordered stream.
pub struct QuicSession {
    conn: quinn::Connection,
    send: Mutex<SendStream>,
    recv: Mutex<RecvStream>,
}

#[async_trait]
impl Session for QuicSession {
    fn max_datagram_size(&self) -> usize {
        self.conn.max_datagram_size().unwrap_or(0)
    }

    fn supports_stream(&self) -> bool {
        true
    }

    async fn send_datagram(&self, payload: &[u8]) -> Result<(), SessionError> {
        self.conn
            .send_datagram(Bytes::copy_from_slice(payload))
            .map_err(|err| SessionError::Datagram(err.to_string()))
    }

    async fn recv_datagram(&self, buf: &mut [u8]) -> Result<usize, SessionError> {
        let datagram = self
            .conn
            .read_datagram()
            .await
            .map_err(|_| SessionError::Closed)?;
        if datagram.len() > buf.len() {
            return Err(SessionError::Datagram(format!(
                "datagram of {} bytes exceeds receive buffer",
                datagram.len()
            )));
        }
        buf[..datagram.len()].copy_from_slice(&datagram);
        Ok(datagram.len())
    }

    async fn send_stream(&self, bytes: &[u8]) -> Result<(), SessionError> {
        self.send
            .lock()
            .await
            .write_all(bytes)
            .await
            .map_err(|err| SessionError::Stream(err.to_string()))
    }

    async fn recv_stream(&self, buf: &mut [u8]) -> Result<usize, SessionError> {
        match self.recv.lock().await.read(buf).await {
            Ok(Some(len)) => Ok(len),
            Ok(None) => Ok(0),
            Err(err) => Err(SessionError::Stream(err.to_string())),
        }
    }

    async fn close(&self) {
        self.conn.close(VarInt::from_u32(0), b"disconnect");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_explicit_port() {
        let (host, port) = parse_endpoint("https://game.example:4433").unwrap();
        assert_eq!(host, "game.example");
        assert_eq!(port, 4433);
    }

    #[test]
    fn defaults_to_port_443() {
        let (host, port) = parse_endpoint("https://game.example").unwrap();
        assert_eq!(host, "game.example");
        assert_eq!(port, 443);
    }

    #[test]
    fn rejects_unparseable_url() {
        assert!(matches!(
            parse_endpoint("not a url"),
            Err(DialError::InvalidUrl(_))
        ));
    }

    #[test]
    fn builds_client_config_for_every_hint() {
        for hint in [
            CongestionHint::Default,
            CongestionHint::LowLatency,
            CongestionHint::Throughput,
        ] {
            let config = TransportConfig::new(vec!["https://a.example".into()])
                .with_congestion_hint(hint);
            assert!(QuicDialer::client_config(&config).is_ok());
        }
    }
}
