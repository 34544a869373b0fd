//! Subject Alternative Name classification.

use std::net::IpAddr;

use serde::Serialize;

/// SAN candidates partitioned into IP literals and DNS names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassifiedSans {
    /// Entries that parsed as IPv4 or IPv6 literals, in input order.
    pub ip_addresses: Vec<IpAddr>,
    /// Everything else, in input order.
    pub dns_names: Vec<String>,
}

impl ClassifiedSans {
    /// Total number of classified entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ip_addresses.len() + self.dns_names.len()
    }

    /// Returns true when nothing was classified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ip_addresses.is_empty() && self.dns_names.is_empty()
    }
}

/// Splits `candidates` into IP addresses and DNS names.
///
/// An entry is an IP address iff it parses strictly as one (dotted quad or
/// colon form); every other entry is a DNS name. Nothing is dropped.
pub fn classify<S: AsRef<str>>(candidates: &[S]) -> ClassifiedSans {
    let mut sans = ClassifiedSans::default();
    for candidate in candidates {
        let candidate = candidate.as_ref();
        match candidate.parse::<IpAddr>() {
            Ok(ip) => sans.ip_addresses.push(ip),
            Err(_) => sans.dns_names.push(candidate.to_string()),
        }
    }
    sans
}
