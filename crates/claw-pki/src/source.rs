//! Where the certificate under test comes from.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use url::{Host, Url};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::{Error, Result};
use crate::pem;
use crate::transport::Transport;

/// Port dialed when a URL names none.
pub const DEFAULT_TLS_PORT: u16 = 443;

/// A `host:port` pair to handshake with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Creates an endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host`, `host:port` or `scheme://host[:port][/path]`.
    ///
    /// The port defaults to 443 when absent. IPv6 literals must be
    /// bracketed when a port follows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dial`] if the input has no host or an invalid port.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let parsed = if input.contains("://") {
            Url::parse(input)
        } else {
            Url::parse(&format!("https://{input}"))
        }
        .map_err(|e| Error::Dial(format!("invalid URL '{input}': {e}")))?;

        let host = match parsed.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            _ => return Err(Error::Dial(format!("URL '{input}' has no host"))),
        };
        let port = parsed.port().unwrap_or(DEFAULT_TLS_PORT);
        Ok(Self { host, port })
    }

    /// Returns the host name or IP literal, without brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// A certificate obtained from a [`CertificateSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourcedCertificate {
    /// Leaf certificate DER.
    #[serde(skip)]
    pub leaf: Vec<u8>,
    /// Remaining certificates as presented by the peer; empty for files.
    #[serde(skip)]
    pub presented_chain: Vec<Vec<u8>>,
    /// File path or `host:port`.
    pub origin: String,
}

/// Location of the certificate to inspect or verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSource {
    /// A PEM file holding a single certificate block.
    File(PathBuf),
    /// A TLS endpoint.
    Remote(Endpoint),
}

impl CertificateSource {
    /// Source for a local file.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::File(path.as_ref().to_path_buf())
    }

    /// Source for a URL; see [`Endpoint::parse`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dial`] for unparsable URLs.
    pub fn url(input: &str) -> Result<Self> {
        Endpoint::parse(input).map(Self::Remote)
    }

    /// Hostname implied by the source; remote sources bind to their host.
    #[must_use]
    pub fn implied_hostname(&self) -> Option<&str> {
        match self {
            Self::File(_) => None,
            Self::Remote(endpoint) => Some(endpoint.host()),
        }
    }

    /// Fetches the certificate.
    ///
    /// # Errors
    ///
    /// For files: [`Error::Io`] if unreadable, [`Error::Decode`] without a
    /// PEM block, [`Error::Parse`] if the DER is not a certificate. For
    /// endpoints, the errors of [`Transport::handshake`].
    pub fn fetch(&self, transport: &dyn Transport) -> Result<SourcedCertificate> {
        match self {
            Self::File(path) => read_certificate_file(path),
            Self::Remote(endpoint) => {
                let session = transport.handshake(endpoint)?;
                let mut chain = session.chain.into_iter();
                let Some(leaf) = chain.next() else {
                    return Err(Error::Handshake(format!(
                        "no certificate returned from {endpoint}"
                    )));
                };
                Ok(SourcedCertificate {
                    leaf,
                    presented_chain: chain.collect(),
                    origin: endpoint.to_string(),
                })
            }
        }
    }
}

/// Reads a single-certificate PEM file.
///
/// # Errors
///
/// Returns [`Error::Io`], [`Error::Decode`] or [`Error::Parse`], each naming
/// the file.
pub fn read_certificate_file(path: &Path) -> Result<SourcedCertificate> {
    let origin = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|e| Error::io(&origin, e))?;
    let block = pem::decode(&text).map_err(|e| Error::Decode(format!("{origin}: {e}")))?;
    if block.label() != pem::CERTIFICATE {
        return Err(Error::Decode(format!(
            "{origin}: expected a CERTIFICATE block, found '{}'",
            block.label()
        )));
    }

    X509Certificate::from_der(block.der())
        .map_err(|e| Error::Parse(format!("{origin}: invalid certificate: {e}")))?;
    debug!(%origin, "read certificate file");

    Ok(SourcedCertificate {
        leaf: block.into_der(),
        presented_chain: Vec::new(),
        origin,
    })
}
