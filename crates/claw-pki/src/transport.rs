//! Live TLS handshakes for capturing a peer's certificate chain.
//!
//! The handshake checks that the peer owns the key of the certificate it
//! presents, but accepts any chain. Whether that chain is trusted is decided
//! afterwards by [`ChainVerifier`](crate::verify::ChainVerifier).

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PkiConfig;
use crate::error::{Error, Result};
use crate::keys::PrivateKey;
use crate::pem;
use crate::source::Endpoint;

/// What a completed handshake revealed about the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerSession {
    /// Presented chain, leaf first, DER-encoded.
    #[serde(skip)]
    pub chain: Vec<Vec<u8>>,
    /// Negotiated protocol version, e.g. `TLSv1_3`.
    pub protocol: Option<String>,
    /// Negotiated cipher suite.
    pub cipher_suite: Option<String>,
}

/// Performs handshakes against remote endpoints.
pub trait Transport {
    /// Connects to `endpoint` and returns the presented certificate chain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dial`] when the endpoint cannot be resolved,
    /// [`Error::Handshake`] when it is unreachable, times out or presents no
    /// certificate, and [`Error::Auth`] when client credentials are refused.
    fn handshake(&self, endpoint: &Endpoint) -> Result<PeerSession>;
}

/// Certificate chain and key presented for mutual TLS.
pub struct ClientIdentity {
    chain: Vec<Vec<u8>>,
    key: PrivateKey,
}

impl ClientIdentity {
    /// Creates an identity from a DER chain (leaf first) and its key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the chain is empty.
    pub fn new(chain: Vec<Vec<u8>>, key: PrivateKey) -> Result<Self> {
        if chain.is_empty() {
            return Err(Error::Auth("client certificate chain is empty".into()));
        }
        Ok(Self { chain, key })
    }

    /// Loads an identity from PEM certificate and key text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] or [`Error::Parse`] for unreadable input and
    /// [`Error::Auth`] if no certificate block is present.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let chain = pem::decode_all(cert_pem)?
            .into_iter()
            .filter(|block| block.label() == pem::CERTIFICATE)
            .map(pem::PemBlock::into_der)
            .collect();
        let key = PrivateKey::from_pem(key_pem, "client key")?;
        Self::new(chain, key)
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("chain_len", &self.chain.len())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// [`Transport`] over a blocking `TcpStream` with rustls.
#[derive(Debug)]
pub struct TlsTransport {
    timeout: Duration,
    identity: Option<ClientIdentity>,
    provider: Arc<CryptoProvider>,
}

impl TlsTransport {
    /// Creates a transport whose connect and handshake must finish within
    /// `timeout` in total.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            identity: None,
            provider: Arc::new(rustls::crypto::ring::default_provider()),
        }
    }

    /// Creates a transport using the configured handshake timeout.
    #[must_use]
    pub fn from_config(config: &PkiConfig) -> Self {
        Self::new(config.handshake_timeout())
    }

    /// Presents `identity` when the server asks for a client certificate.
    #[must_use]
    pub fn with_identity(mut self, identity: ClientIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Returns the configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn client_config(&self) -> Result<ClientConfig> {
        let builder = ClientConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Handshake(format!("unsupported protocol versions: {e}")))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyChain {
                provider: Arc::clone(&self.provider),
            }));

        match &self.identity {
            None => Ok(builder.with_no_client_auth()),
            Some(identity) => {
                let chain = identity
                    .chain
                    .iter()
                    .map(|der| CertificateDer::from(der.clone()))
                    .collect();
                let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(identity.key.der().to_vec()));
                builder
                    .with_client_auth_cert(chain, key)
                    .map_err(|e| Error::Auth(format!("unusable client credentials: {e}")))
            }
        }
    }

    fn connect(&self, endpoint: &Endpoint, deadline: Instant) -> Result<TcpStream> {
        let addrs: Vec<_> = (endpoint.host(), endpoint.port())
            .to_socket_addrs()
            .map_err(|e| Error::Dial(format!("cannot resolve {endpoint}: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(Error::Dial(format!("{endpoint} resolved to no addresses")));
        }

        let mut last_error = None;
        for addr in addrs {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.timed_out(endpoint));
            }
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(stream) => {
                    debug!(%addr, "connected");
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(%addr, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error.map_or_else(|| "no address reachable".to_string(), |e| e.to_string());
        Err(Error::Handshake(format!("failed to connect to {endpoint}: {reason}")))
    }
}

impl Transport for TlsTransport {
    fn handshake(&self, endpoint: &Endpoint) -> Result<PeerSession> {
        let server_name = ServerName::try_from(endpoint.host().to_string())
            .map_err(|e| Error::Dial(format!("invalid server name '{}': {e}", endpoint.host())))?;
        let config = self.client_config()?;

        let deadline = Instant::now() + self.timeout;
        let mut stream = DeadlineStream {
            inner: self.connect(endpoint, deadline)?,
            deadline,
        };

        let mut conn = ClientConnection::new(Arc::new(config), server_name)
            .map_err(|e| Error::Handshake(format!("failed to start TLS session: {e}")))?;

        while conn.is_handshaking() {
            conn.complete_io(&mut stream)
                .map_err(|e| self.handshake_error(endpoint, &e))?;
        }

        let chain: Vec<Vec<u8>> = conn
            .peer_certificates()
            .map(|certs| certs.iter().map(|c| c.as_ref().to_vec()).collect())
            .unwrap_or_default();
        if chain.is_empty() {
            return Err(Error::Handshake(format!(
                "no certificate returned from {endpoint}"
            )));
        }

        let session = PeerSession {
            chain,
            protocol: conn.protocol_version().map(|v| format!("{v:?}")),
            cipher_suite: conn
                .negotiated_cipher_suite()
                .map(|suite| format!("{:?}", suite.suite())),
        };

        conn.send_close_notify();
        if let Err(e) = conn.complete_io(&mut stream) {
            debug!(error = %e, "close_notify not delivered");
        }

        info!(
            %endpoint,
            certificates = session.chain.len(),
            protocol = session.protocol.as_deref().unwrap_or("unknown"),
            "captured peer chain"
        );
        Ok(session)
    }
}

impl TlsTransport {
    fn timed_out(&self, endpoint: &Endpoint) -> Error {
        Error::Handshake(format!(
            "handshake with {endpoint} timed out after {:?}",
            self.timeout
        ))
    }

    fn handshake_error(&self, endpoint: &Endpoint, e: &io::Error) -> Error {
        if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) {
            return self.timed_out(endpoint);
        }

        let tls_error = e.get_ref().and_then(|inner| inner.downcast_ref::<rustls::Error>());
        if let (Some(rustls::Error::AlertReceived(alert)), Some(_)) = (tls_error, &self.identity) {
            use rustls::AlertDescription as Alert;
            if matches!(
                alert,
                Alert::BadCertificate
                    | Alert::CertificateRequired
                    | Alert::UnknownCA
                    | Alert::AccessDenied
                    | Alert::CertificateUnknown
            ) {
                warn!(%endpoint, ?alert, "client certificate rejected");
                return Error::Auth(format!("{endpoint} rejected the client certificate: {alert:?}"));
            }
        }

        Error::Handshake(format!("handshake with {endpoint} failed: {e}"))
    }
}

/// A socket whose every read and write is bounded by one shared deadline.
///
/// Per-call socket timeouts alone restart on each byte, so a peer trickling
/// data could hold the handshake open indefinitely.
struct DeadlineStream {
    inner: TcpStream,
    deadline: Instant,
}

impl DeadlineStream {
    fn remaining(&self) -> io::Result<Duration> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "handshake deadline passed"));
        }
        Ok(remaining)
    }
}

impl Read for DeadlineStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining()?;
        self.inner.set_read_timeout(Some(remaining))?;
        self.inner.read(buf)
    }
}

impl Write for DeadlineStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let remaining = self.remaining()?;
        self.inner.set_write_timeout(Some(remaining))?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Checks handshake signatures but leaves chain trust to the caller.
#[derive(Debug)]
struct AcceptAnyChain {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyChain {
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
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
