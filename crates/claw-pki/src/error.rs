//! PKI error types.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type for PKI operations.
pub type Result<T> = std::result::Result<T, Error>;

/// PKI error variants.
#[derive(Debug, Error)]
pub enum Error {
    /// Required input is missing or malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No usable PEM block could be decoded.
    #[error("PEM decoding failed: {0}")]
    Decode(String),

    /// DER content is not a valid certificate, request or key.
    #[error("parsing failed: {0}")]
    Parse(String),

    /// The CA file contributed no usable trust root.
    #[error("trust store error: {0}")]
    TrustStore(String),

    /// The remote endpoint could not be resolved or addressed.
    #[error("dial failed: {0}")]
    Dial(String),

    /// The TLS handshake failed, timed out or returned no certificates.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Client credentials were unusable or rejected by the peer.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Chain or hostname verification failed.
    #[error("certificate verification failed ({reason}): {detail}")]
    Verification {
        /// Classified failure reason.
        reason: FailureReason,
        /// Underlying diagnostic from the path builder.
        detail: String,
    },

    /// Key generation failed.
    #[error("key generation failed: {0}")]
    KeyGen(String),

    /// Signing a certificate or request failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File the operation was acting on.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Builds an [`Error::Io`] for the given path.
    pub fn io(path: impl fmt::Display, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }

    /// Returns true for network and transport failures a caller may retry.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Dial(_) | Self::Handshake(_) | Self::Auth(_))
    }
}

/// Why a certificate chain was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The certificate's `notAfter` is in the past.
    Expired,
    /// The certificate's `notBefore` is in the future.
    NotYetValid,
    /// No path leads to a trusted root, including when a candidate issuer's
    /// key does not verify the chain.
    UntrustedRoot,
    /// The certificate is not valid for the expected hostname.
    NameMismatch,
    /// A CA certificate was presented as the leaf.
    CaUsedAsLeaf,
    /// Anything else reported by the path builder.
    Other,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Expired => "expired",
            Self::NotYetValid => "not yet valid",
            Self::UntrustedRoot => "untrusted root",
            Self::NameMismatch => "name mismatch",
            Self::CaUsedAsLeaf => "CA used as leaf",
            Self::Other => "other",
        };
        f.write_str(text)
    }
}
