//! Certificate chain verification.
//!
//! [`ChainVerifier`] is a typestate machine:
//!
//! ```text
//! Start -> RootsLoaded -> CertSourced -> Verified
//!                                     \-> Err(Verification)
//! ```
//!
//! Each state is its own type, so a certificate cannot be verified before
//! roots are loaded and a result cannot exist without a sourced certificate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustls::pki_types::{CertificateDer, ServerName, TrustAnchor, UnixTime};
use serde::Serialize;
use tracing::{debug, info, warn};
use webpki::{anchor_from_trusted_cert, EndEntityCert, KeyUsage};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, FailureReason, Result};
use crate::pem;
use crate::source::{CertificateSource, SourcedCertificate};
use crate::transport::Transport;

/// Trust roots, intermediates and the expected hostname of one verification.
#[derive(Debug, Clone)]
pub struct TrustContext {
    anchors: Vec<TrustAnchor<'static>>,
    root_ders: Vec<Vec<u8>>,
    intermediates: Vec<CertificateDer<'static>>,
    hostname: Option<String>,
}

impl TrustContext {
    /// Builds a root pool from every `CERTIFICATE` block in `text`.
    ///
    /// Blocks that do not parse as trust anchors are skipped with a warning.
    /// The intermediate pool starts empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrustStore`] if no block yields a trust anchor.
    pub fn from_pem(text: &str) -> Result<Self> {
        let blocks = pem::decode_all(text).map_err(|e| Error::TrustStore(e.to_string()))?;

        let mut anchors = Vec::new();
        let mut root_ders = Vec::new();
        for block in blocks {
            if block.label() != pem::CERTIFICATE {
                debug!(label = block.label(), "skipping non-certificate block");
                continue;
            }
            let der = CertificateDer::from(block.der());
            match anchor_from_trusted_cert(&der) {
                Ok(anchor) => {
                    anchors.push(anchor.to_owned());
                    root_ders.push(block.into_der());
                }
                Err(e) => warn!(error = ?e, "skipping unparsable CA certificate"),
            }
        }

        if anchors.is_empty() {
            return Err(Error::TrustStore(
                "no usable CA certificate found".into(),
            ));
        }
        debug!(roots = anchors.len(), "loaded trust roots");

        Ok(Self {
            anchors,
            root_ders,
            intermediates: Vec::new(),
            hostname: None,
        })
    }

    /// Number of trust roots.
    #[must_use]
    pub fn root_count(&self) -> usize {
        self.anchors.len()
    }

    /// Sets the hostname the leaf must be valid for.
    #[must_use]
    pub fn with_hostname(mut self, hostname: Option<String>) -> Self {
        self.hostname = hostname.filter(|h| !h.trim().is_empty());
        self
    }

    /// Returns the expected hostname.
    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    fn is_root(&self, der: &[u8]) -> bool {
        self.root_ders.iter().any(|root| root == der)
    }
}

/// Initial state.
#[derive(Debug, Clone, Copy)]
pub struct Start;

/// Roots are loaded.
#[derive(Debug, Clone)]
pub struct RootsLoaded {
    trust: TrustContext,
}

/// Roots are loaded and the certificate under test is in hand.
#[derive(Debug, Clone)]
pub struct CertSourced {
    trust: TrustContext,
    cert: SourcedCertificate,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verified {
    /// File path or `host:port` of the verified certificate.
    pub origin: String,
    /// Subject of the leaf.
    pub subject: String,
    /// Hostname the leaf was checked against, if any.
    pub hostname: Option<String>,
    /// Certificates in the verified path, leaf and root included.
    pub path_length: usize,
    /// Whether the leaf is itself one of the trust roots.
    pub self_anchored: bool,
}

/// Verifies a certificate against trust roots; see the module docs.
#[derive(Debug, Clone)]
pub struct ChainVerifier<S> {
    state: S,
    clock: Arc<dyn Clock>,
}

impl Default for ChainVerifier<Start> {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainVerifier<Start> {
    /// Creates a verifier reading the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a verifier reading the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Start,
            clock,
        }
    }

    /// Loads trust roots from CA PEM text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrustStore`] if no root can be loaded.
    pub fn load_roots(self, ca_pem: &str) -> Result<ChainVerifier<RootsLoaded>> {
        let trust = TrustContext::from_pem(ca_pem)?;
        Ok(self.with_trust(trust))
    }

    /// Uses an already built trust context.
    #[must_use]
    pub fn with_trust(self, trust: TrustContext) -> ChainVerifier<RootsLoaded> {
        ChainVerifier {
            state: RootsLoaded { trust },
            clock: self.clock,
        }
    }
}

impl ChainVerifier<RootsLoaded> {
    /// Requires the leaf to be valid for `hostname`.
    #[must_use]
    pub fn expect_hostname(mut self, hostname: Option<String>) -> Self {
        self.state.trust = self.state.trust.with_hostname(hostname);
        self
    }

    /// Returns the trust context.
    #[must_use]
    pub const fn trust(&self) -> &TrustContext {
        &self.state.trust
    }

    /// Fetches the certificate under test.
    ///
    /// Remote sources bind the verification to their host unless a hostname
    /// was already set.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`CertificateSource::fetch`].
    pub fn source(
        self,
        source: &CertificateSource,
        transport: &dyn Transport,
    ) -> Result<ChainVerifier<CertSourced>> {
        let cert = source.fetch(transport)?;
        let mut verifier = self;
        if verifier.state.trust.hostname.is_none() {
            let implied = source.implied_hostname().map(String::from);
            verifier = verifier.expect_hostname(implied);
        }
        Ok(verifier.with_certificate(cert))
    }

    /// Uses an already sourced certificate.
    #[must_use]
    pub fn with_certificate(self, cert: SourcedCertificate) -> ChainVerifier<CertSourced> {
        debug!(origin = %cert.origin, "certificate sourced");
        ChainVerifier {
            state: CertSourced {
                trust: self.state.trust,
                cert,
            },
            clock: self.clock,
        }
    }
}

impl ChainVerifier<CertSourced> {
    /// Returns the sourced certificate.
    #[must_use]
    pub const fn certificate(&self) -> &SourcedCertificate {
        &self.state.cert
    }

    /// Builds a path to a trusted root and checks the hostname.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the leaf is not a certificate and
    /// [`Error::Verification`] if no trusted path exists or the hostname
    /// does not match.
    pub fn verify(self) -> Result<Verified> {
        let CertSourced { trust, cert } = self.state;
        let now = self.clock.now();

        let leaf_der = CertificateDer::from(cert.leaf.as_slice());
        let leaf = EndEntityCert::try_from(&leaf_der)
            .map_err(|e| Error::Parse(format!("{}: invalid certificate: {e:?}", cert.origin)))?;

        let self_anchored = trust.is_root(&cert.leaf);
        let path_length = if self_anchored {
            check_validity_window(&cert.leaf, now)?;
            1
        } else {
            let intermediates: Vec<CertificateDer<'static>> = trust
                .intermediates
                .iter()
                .cloned()
                .chain(
                    cert.presented_chain
                        .iter()
                        .map(|der| CertificateDer::from(der.clone())),
                )
                .collect();

            let path = leaf
                .verify_for_usage(
                    webpki::ALL_VERIFICATION_ALGS,
                    &trust.anchors,
                    &intermediates,
                    unix_time(now),
                    KeyUsage::server_auth(),
                    None,
                    None,
                )
                .map_err(chain_error)?;
            path.intermediate_certificates().count() + 2
        };

        if let Some(hostname) = trust.hostname() {
            let name = ServerName::try_from(hostname).map_err(|e| Error::Verification {
                reason: FailureReason::NameMismatch,
                detail: format!("invalid hostname '{hostname}': {e}"),
            })?;
            leaf.verify_is_valid_for_subject_name(&name)
                .map_err(|e| Error::Verification {
                    reason: FailureReason::NameMismatch,
                    detail: format!("certificate is not valid for '{hostname}': {e:?}"),
                })?;
        }

        let subject = subject_of(&cert.leaf);
        info!(
            origin = %cert.origin,
            %subject,
            hostname = trust.hostname().unwrap_or("-"),
            self_anchored,
            "certificate verification succeeded"
        );
        Ok(Verified {
            origin: cert.origin,
            subject,
            hostname: trust.hostname,
            path_length,
            self_anchored,
        })
    }
}

fn unix_time(now: DateTime<Utc>) -> UnixTime {
    let secs = u64::try_from(now.timestamp()).unwrap_or_default();
    UnixTime::since_unix_epoch(std::time::Duration::from_secs(secs))
}

fn check_validity_window(der: &[u8], now: DateTime<Utc>) -> Result<()> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| Error::Parse(format!("invalid certificate: {e}")))?;
    let validity = cert.validity();
    let now = now.timestamp();

    if now < validity.not_before.timestamp() {
        return Err(Error::Verification {
            reason: FailureReason::NotYetValid,
            detail: format!("certificate is not valid before {}", validity.not_before),
        });
    }
    if now > validity.not_after.timestamp() {
        return Err(Error::Verification {
            reason: FailureReason::Expired,
            detail: format!("certificate expired at {}", validity.not_after),
        });
    }
    Ok(())
}

/// Classifies a path-building failure.
///
/// A signature that no candidate issuer key verifies means no trusted
/// authority signed the chain, even when a root carries the issuer's name.
fn chain_error(error: webpki::Error) -> Error {
    let reason = match &error {
        webpki::Error::CertExpired { .. } => FailureReason::Expired,
        webpki::Error::CertNotValidYet { .. } => FailureReason::NotYetValid,
        webpki::Error::UnknownIssuer
        | webpki::Error::InvalidSignatureForPublicKey { .. }
        | webpki::Error::UnsupportedSignatureAlgorithmForPublicKeyContext(_) => {
            FailureReason::UntrustedRoot
        }
        webpki::Error::CertNotValidForName { .. } => FailureReason::NameMismatch,
        webpki::Error::CaUsedAsEndEntity => FailureReason::CaUsedAsLeaf,
        _ => FailureReason::Other,
    };
    warn!(?error, %reason, "certificate chain rejected");
    Error::Verification {
        reason,
        detail: format!("{error:?}"),
    }
}

fn subject_of(der: &[u8]) -> String {
    X509Certificate::from_der(der)
        .map(|(_, cert)| cert.subject().to_string())
        .unwrap_or_default()
}
