//! Tool configuration.
//!
//! Every field has a default, so a missing config file is not an error. A
//! config file is JSON and may set any subset of fields.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Serial number used when the caller does not supply one.
pub const DEFAULT_SERIAL: u64 = 1;

/// Validity period used when the caller does not supply one.
pub const DEFAULT_VALIDITY_DAYS: u32 = 365;

/// Smallest RSA modulus the key provider will generate.
///
/// This is also the smallest RSA key the signer can load, so configuration
/// may raise it but not lower it.
pub const DEFAULT_MIN_RSA_BITS: usize = 2048;

/// Largest RSA modulus the signer can load.
pub const MAX_RSA_BITS: usize = 8192;

/// Settings shared by template construction, key generation and verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PkiConfig {
    /// IP SANs injected into every certificate template.
    pub default_ips: Vec<IpAddr>,
    /// Validity period in days when `--days` is not given.
    pub default_days: u32,
    /// Serial number when `--serial` is not given.
    pub default_serial: u64,
    /// Ceiling for connecting and completing a TLS handshake.
    pub handshake_timeout_secs: u64,
    /// Smallest RSA key size accepted for generation, at least 2048.
    pub min_rsa_bits: usize,
}

impl Default for PkiConfig {
    fn default() -> Self {
        Self {
            default_ips: vec![
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(Ipv6Addr::LOCALHOST),
            ],
            default_days: DEFAULT_VALIDITY_DAYS,
            default_serial: DEFAULT_SERIAL,
            handshake_timeout_secs: 10,
            min_rsa_bits: DEFAULT_MIN_RSA_BITS,
        }
    }
}

impl PkiConfig {
    /// Loads configuration from `path`, or returns defaults when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`]
    /// if it is not valid JSON or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path.display(), e))?;
        let config = Self::from_json(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parses configuration from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document is malformed or invalid.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| Error::Config(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.default_days == 0 {
            return Err(Error::Config("default_days must be greater than 0".into()));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(Error::Config(
                "handshake_timeout_secs must be greater than 0".into(),
            ));
        }
        if !(DEFAULT_MIN_RSA_BITS..=MAX_RSA_BITS).contains(&self.min_rsa_bits) {
            return Err(Error::Config(format!(
                "min_rsa_bits must be between {DEFAULT_MIN_RSA_BITS} and {MAX_RSA_BITS}"
            )));
        }
        Ok(())
    }

    /// Returns the handshake timeout as a [`Duration`].
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}
