//! Certificate template construction.
//!
//! [`TemplateFactory`] produces one of three shapes: a self-signed leaf, a
//! CA, or a certificate signing request. Templates are plain data; turning
//! them into DER is the [`Signer`](crate::signer::Signer)'s job.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::Serialize;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::{PkiConfig, DEFAULT_SERIAL};
use crate::error::{Error, Result};
use crate::san;
use crate::subject::Subject;

/// Which template shape to build; chosen once by the command layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    /// Self-signed (or CA-signed) end-entity certificate.
    Leaf,
    /// Self-signed certificate authority.
    Ca,
    /// Certificate signing request.
    Csr,
}

/// Basic key usages set on certificate templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KeyUsage {
    /// `digitalSignature`
    DigitalSignature,
    /// `keyCertSign`
    CertSign,
}

/// Extended key usage purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExtendedKeyUsage {
    /// TLS client authentication.
    ClientAuth,
    /// TLS server authentication.
    ServerAuth,
}

impl ExtendedKeyUsage {
    /// Returns the OID string for this key usage.
    #[must_use]
    pub const fn oid(&self) -> &'static str {
        match self {
            Self::ServerAuth => "1.3.6.1.5.5.7.3.1",
            Self::ClientAuth => "1.3.6.1.5.5.7.3.2",
        }
    }
}

/// Signature algorithm pinned on a request template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignatureAlgorithm {
    /// `sha256WithRSAEncryption`
    Sha256WithRsa,
}

impl SignatureAlgorithm {
    /// Returns the OID string for this algorithm.
    #[must_use]
    pub const fn oid(&self) -> &'static str {
        match self {
            Self::Sha256WithRsa => "1.2.840.113549.1.1.11",
        }
    }
}

/// Fields of a leaf or CA certificate template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertTemplate {
    /// Serial number.
    pub serial: u64,
    /// Start of the validity window.
    pub not_before: DateTime<Utc>,
    /// End of the validity window.
    pub not_after: DateTime<Utc>,
    /// Subject, also used as issuer when self-signed.
    pub subject: Subject,
    /// Basic key usages.
    pub key_usage: Vec<KeyUsage>,
    /// Extended key usages.
    pub ext_key_usage: Vec<ExtendedKeyUsage>,
    /// IP address SANs.
    pub ip_addresses: Vec<IpAddr>,
    /// DNS name SANs.
    pub dns_names: Vec<String>,
    /// Whether the certificate may sign other certificates.
    pub is_ca: bool,
    /// Whether the basic constraints extension is emitted.
    pub basic_constraints_valid: bool,
}

/// Fields of a certificate signing request template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsrTemplate {
    /// Subject including the e-mail extra attribute.
    pub subject: Subject,
    /// IP address SANs.
    pub ip_addresses: Vec<IpAddr>,
    /// DNS name SANs.
    pub dns_names: Vec<String>,
    /// Signature algorithm the request must be signed with.
    pub signature_algorithm: SignatureAlgorithm,
}

/// A built template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CertificateTemplate {
    /// End-entity certificate.
    Leaf(CertTemplate),
    /// Certificate authority.
    Ca(CertTemplate),
    /// Certificate signing request.
    Csr(CsrTemplate),
}

impl CertificateTemplate {
    /// Returns the shape of this template.
    #[must_use]
    pub const fn kind(&self) -> TemplateKind {
        match self {
            Self::Leaf(_) => TemplateKind::Leaf,
            Self::Ca(_) => TemplateKind::Ca,
            Self::Csr(_) => TemplateKind::Csr,
        }
    }

    /// Returns the subject of any template shape.
    #[must_use]
    pub const fn subject(&self) -> &Subject {
        match self {
            Self::Leaf(t) | Self::Ca(t) => &t.subject,
            Self::Csr(t) => &t.subject,
        }
    }

    /// Returns the certificate fields for leaf and CA templates.
    #[must_use]
    pub const fn as_certificate(&self) -> Option<&CertTemplate> {
        match self {
            Self::Leaf(t) | Self::Ca(t) => Some(t),
            Self::Csr(_) => None,
        }
    }
}

/// Parameters for [`TemplateFactory::build`].
#[derive(Debug, Clone)]
pub struct TemplateRequest {
    /// Subject from the subject builder.
    pub subject: Subject,
    /// SAN candidates; ignored for leaf templates.
    pub sans: Vec<String>,
    /// Validity period in days; ignored for requests.
    pub days: u32,
    /// Serial number; [`DEFAULT_SERIAL`] when unset.
    pub serial: Option<u64>,
    /// Marks a leaf template as a CA.
    pub is_ca: bool,
}

/// Defaults injected into every certificate template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDefaults {
    /// IP SANs present on every leaf and CA template.
    pub default_ips: Vec<IpAddr>,
}

impl Default for TemplateDefaults {
    fn default() -> Self {
        Self {
            default_ips: PkiConfig::default().default_ips,
        }
    }
}

impl From<&PkiConfig> for TemplateDefaults {
    fn from(config: &PkiConfig) -> Self {
        Self {
            default_ips: config.default_ips.clone(),
        }
    }
}

/// Builds certificate templates.
#[derive(Debug, Clone)]
pub struct TemplateFactory {
    defaults: TemplateDefaults,
    clock: Arc<dyn Clock>,
}

impl Default for TemplateFactory {
    fn default() -> Self {
        Self::new(TemplateDefaults::default())
    }
}

impl TemplateFactory {
    /// Creates a factory reading the system clock.
    #[must_use]
    pub fn new(defaults: TemplateDefaults) -> Self {
        Self::with_clock(defaults, Arc::new(SystemClock))
    }

    /// Creates a factory reading the given clock.
    #[must_use]
    pub fn with_clock(defaults: TemplateDefaults, clock: Arc<dyn Clock>) -> Self {
        Self { defaults, clock }
    }

    /// Returns the configured defaults.
    #[must_use]
    pub const fn defaults(&self) -> &TemplateDefaults {
        &self.defaults
    }

    /// Builds a template of the given kind.
    ///
    /// # Errors
    ///
    /// Propagates the errors of the kind-specific builder.
    pub fn build(&self, kind: TemplateKind, request: TemplateRequest) -> Result<CertificateTemplate> {
        match kind {
            TemplateKind::Leaf => {
                self.build_leaf(request.subject, request.days, request.serial, request.is_ca)
            }
            TemplateKind::Ca => {
                self.build_ca(request.subject, &request.sans, request.days, request.serial)
            }
            TemplateKind::Csr => {
                let email = request.subject.email.clone().unwrap_or_default();
                self.build_csr(request.subject, &request.sans, &email)
            }
        }
    }

    /// Builds a leaf template valid for `days` from now.
    ///
    /// Only the configured default IPs are added as SANs. When `is_ca` is
    /// set the template is marked as a CA.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty common name or zero days.
    pub fn build_leaf(
        &self,
        subject: Subject,
        days: u32,
        serial: Option<u64>,
        is_ca: bool,
    ) -> Result<CertificateTemplate> {
        let template = self.certificate(subject, days, serial, is_ca)?;
        debug!(
            subject = %template.subject.common_name,
            serial = template.serial,
            is_ca,
            "built leaf template"
        );
        Ok(CertificateTemplate::Leaf(template))
    }

    /// Builds a CA template with the classified SANs merged in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty common name or zero days.
    pub fn build_ca<S: AsRef<str>>(
        &self,
        subject: Subject,
        sans: &[S],
        days: u32,
        serial: Option<u64>,
    ) -> Result<CertificateTemplate> {
        let mut template = self.certificate(subject, days, serial, true)?;
        let classified = san::classify(sans);
        template.ip_addresses.extend(classified.ip_addresses);
        template.dns_names.extend(classified.dns_names);
        debug!(
            subject = %template.subject.common_name,
            serial = template.serial,
            sans = template.ip_addresses.len() + template.dns_names.len(),
            "built CA template"
        );
        Ok(CertificateTemplate::Ca(template))
    }

    /// Builds a CSR template carrying `email` as a PKCS#9 attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty common name or an empty or
    /// non-ASCII e-mail address.
    pub fn build_csr<S: AsRef<str>>(
        &self,
        mut subject: Subject,
        sans: &[S],
        email: &str,
    ) -> Result<CertificateTemplate> {
        check_common_name(&subject)?;
        let email = email.trim();
        if email.is_empty() {
            return Err(Error::Validation("E-mail address cannot be empty".into()));
        }
        if !email.is_ascii() {
            return Err(Error::Validation(format!(
                "e-mail address '{email}' must be ASCII"
            )));
        }

        subject.email = Some(email.to_string());
        subject.set_email_attribute(email);

        let classified = san::classify(sans);
        debug!(subject = %subject.common_name, "built CSR template");
        Ok(CertificateTemplate::Csr(CsrTemplate {
            subject,
            ip_addresses: classified.ip_addresses,
            dns_names: classified.dns_names,
            signature_algorithm: SignatureAlgorithm::Sha256WithRsa,
        }))
    }

    fn certificate(
        &self,
        subject: Subject,
        days: u32,
        serial: Option<u64>,
        is_ca: bool,
    ) -> Result<CertTemplate> {
        check_common_name(&subject)?;
        if days == 0 {
            return Err(Error::Validation("days must be greater than 0".into()));
        }

        // X.509 times have whole-second precision.
        let not_before = self.clock.now().trunc_subsecs(0);
        let not_after = not_before + Duration::days(i64::from(days));

        Ok(CertTemplate {
            serial: serial.unwrap_or(DEFAULT_SERIAL),
            not_before,
            not_after,
            subject,
            key_usage: vec![KeyUsage::DigitalSignature, KeyUsage::CertSign],
            ext_key_usage: vec![ExtendedKeyUsage::ClientAuth, ExtendedKeyUsage::ServerAuth],
            ip_addresses: self.defaults.default_ips.clone(),
            dns_names: Vec::new(),
            is_ca,
            basic_constraints_valid: is_ca,
        })
    }
}

fn check_common_name(subject: &Subject) -> Result<()> {
    if subject.common_name.trim().is_empty() {
        return Err(Error::Validation("common name cannot be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::subject::OID_EMAIL_ADDRESS;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn factory() -> TemplateFactory {
        let at = Utc.with_ymd_and_hms(2031, 3, 4, 5, 6, 7).unwrap();
        TemplateFactory::with_clock(TemplateDefaults::default(), Arc::new(FixedClock::new(at)))
    }

    #[test]
    fn leaf_template_shape() {
        let template = factory()
            .build_leaf(Subject::new("leaf.local"), 30, Some(42), false)
            .unwrap();
        let CertificateTemplate::Leaf(cert) = template else {
            panic!("expected leaf template");
        };

        assert_eq!(cert.serial, 42);
        assert!(!cert.is_ca);
        assert!(!cert.basic_constraints_valid);
        assert_eq!(cert.key_usage, vec![KeyUsage::DigitalSignature, KeyUsage::CertSign]);
        assert_eq!(
            cert.ext_key_usage,
            vec![ExtendedKeyUsage::ClientAuth, ExtendedKeyUsage::ServerAuth]
        );
        assert_eq!(
            cert.ip_addresses,
            vec![IpAddr::V4(Ipv4Addr::LOCALHOST), IpAddr::V6(Ipv6Addr::LOCALHOST)]
        );
        assert!(cert.dns_names.is_empty());
    }

    #[test]
    fn leaf_as_ca_sets_constraints() {
        let template = factory()
            .build_leaf(Subject::new("root"), 30, None, true)
            .unwrap();
        let cert = template.as_certificate().unwrap();
        assert!(cert.is_ca);
        assert!(cert.basic_constraints_valid);
        assert_eq!(cert.serial, DEFAULT_SERIAL);
    }

    #[test]
    fn ca_template_merges_sans_after_defaults() {
        let template = factory()
            .build_ca(
                Subject::new("ca.example.com"),
                &["ca.example.com", "10.1.2.3", "*.example.com"],
                3650,
                Some(7),
            )
            .unwrap();
        assert_eq!(template.kind(), TemplateKind::Ca);

        let cert = template.as_certificate().unwrap();
        assert!(cert.is_ca);
        assert!(cert.basic_constraints_valid);
        assert_eq!(cert.ip_addresses.len(), 3);
        assert_eq!(cert.ip_addresses[2], IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)));
        assert_eq!(cert.dns_names, vec!["ca.example.com", "*.example.com"]);
    }

    #[test]
    fn configured_default_ips_replace_loopback() {
        let defaults = TemplateDefaults {
            default_ips: Vec::new(),
        };
        let template = TemplateFactory::new(defaults)
            .build_leaf(Subject::new("leaf"), 1, None, false)
            .unwrap();
        assert!(template.as_certificate().unwrap().ip_addresses.is_empty());
    }

    #[test]
    fn csr_requires_email() {
        let result = factory().build_csr(Subject::new("example.com"), &["example.com"], "");
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn csr_rejects_non_ascii_email() {
        let result = factory().build_csr(Subject::new("example.com"), &["example.com"], "ops@exämple.com");
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn csr_template_shape() {
        let template = factory()
            .build_csr(
                Subject::new("api.example.com"),
                &["api.example.com", "::1"],
                "ops@example.com",
            )
            .unwrap();
        let CertificateTemplate::Csr(csr) = template else {
            panic!("expected CSR template");
        };

        assert_eq!(csr.signature_algorithm, SignatureAlgorithm::Sha256WithRsa);
        assert_eq!(csr.dns_names, vec!["api.example.com"]);
        assert_eq!(csr.ip_addresses, vec![IpAddr::V6(Ipv6Addr::LOCALHOST)]);

        let emails: Vec<_> = csr.subject.email_attributes().collect();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].oid, OID_EMAIL_ADDRESS);
        assert_eq!(emails[0].value, "ops@example.com");
    }

    #[test]
    fn zero_days_rejected() {
        let result = factory().build_leaf(Subject::new("leaf"), 0, None, false);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn empty_common_name_rejected() {
        let result = factory().build_ca(Subject::new(" "), &["x"], 1, None);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn build_dispatches_on_kind() {
        let mut subject = Subject::new("example.com");
        subject.email = Some("ops@example.com".into());
        let request = TemplateRequest {
            subject,
            sans: vec!["example.com".into()],
            days: 10,
            serial: None,
            is_ca: false,
        };

        let factory = factory();
        for kind in [TemplateKind::Leaf, TemplateKind::Ca, TemplateKind::Csr] {
            let template = factory.build(kind, request.clone()).unwrap();
            assert_eq!(template.kind(), kind);
        }
    }

    proptest! {
        #[test]
        fn validity_window_is_exact(days in 1u32..20_000, nanos in 0u32..1_000_000_000) {
            let at = Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap()
                + Duration::nanoseconds(i64::from(nanos));
            let factory = TemplateFactory::with_clock(
                TemplateDefaults::default(),
                Arc::new(FixedClock::new(at)),
            );

            let leaf = factory.build_leaf(Subject::new("leaf"), days, None, false).unwrap();
            let ca = factory.build_ca(Subject::new("ca"), &["ca"], days, None).unwrap();
            for template in [leaf, ca] {
                let cert = template.as_certificate().unwrap();
                prop_assert_eq!(cert.not_after - cert.not_before, Duration::days(i64::from(days)));
                prop_assert_eq!(cert.not_before.timestamp_subsec_nanos(), 0);
            }
        }

        #[test]
        fn only_ca_templates_are_ca(days in 1u32..1000, is_ca in any::<bool>()) {
            let factory = factory();
            let leaf = factory.build_leaf(Subject::new("leaf"), days, None, is_ca).unwrap();
            let leaf = leaf.as_certificate().unwrap();
            prop_assert_eq!(leaf.is_ca, is_ca);
            prop_assert_eq!(leaf.basic_constraints_valid, is_ca);

            let ca = factory.build_ca(Subject::new("ca"), &["ca"], days, None).unwrap();
            let ca = ca.as_certificate().unwrap();
            prop_assert!(ca.is_ca && ca.basic_constraints_valid);
        }
    }
}
