//! Turning templates into signed DER artifacts.
//!
//! rcgen assembles validity, SANs and extensions. Its distinguished names
//! hold one value per attribute type, so the subject and issuer names are
//! encoded with `x509-cert` (one RDN per value) and spliced into the signed
//! structure, which is then signed again.

use std::fmt;

use chrono::{DateTime, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, ExtendedKeyUsagePurpose, Ia5String,
    IsCa, KeyUsagePurpose, SanType, SerialNumber,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::SignatureScheme;
use serde::Serialize;
use tracing::{debug, info};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::der::asn1::{BitString, SetOfVec};
use x509_cert::der::oid::ObjectIdentifier;
use x509_cert::der::{Any, Decode, Encode, Tag};
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::request::CertReq;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::{Error, Result};
use crate::keys::{KeyAlgorithm, PrivateKey};
use crate::pem;
use crate::subject::{NameAttribute, Subject};
use crate::template::{
    CertTemplate, CertificateTemplate, CsrTemplate, ExtendedKeyUsage, KeyUsage, TemplateKind,
};

/// The certificate and key that sign a CA-issued leaf.
pub struct Issuer {
    cert_der: Vec<u8>,
    key: PrivateKey,
}

impl Issuer {
    /// Pairs an issuer certificate with its private key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the certificate cannot be parsed and
    /// [`Error::Signing`] if the key does not belong to it.
    pub fn new(cert_der: Vec<u8>, key: PrivateKey) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(&cert_der)
            .map_err(|e| Error::Parse(format!("invalid issuer certificate: {e}")))?;
        let key_pair = key.key_pair()?;
        if cert.public_key().subject_public_key.data.as_ref() != key_pair.public_key_raw() {
            return Err(Error::Signing(
                "issuer key does not match issuer certificate".into(),
            ));
        }
        Ok(Self { cert_der, key })
    }

    /// Loads an issuer from PEM certificate and key text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if either input has no PEM block, plus the
    /// errors of [`Issuer::new`].
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let block = pem::decode(cert_pem)?;
        if block.label() != pem::CERTIFICATE {
            return Err(Error::Decode(format!(
                "expected a CERTIFICATE block, found '{}'",
                block.label()
            )));
        }
        let key = PrivateKey::from_pem(key_pem, "issuer key")?;
        Self::new(block.into_der(), key)
    }

    /// Returns the issuer certificate DER.
    #[must_use]
    pub fn cert_der(&self) -> &[u8] {
        &self.cert_der
    }
}

impl fmt::Debug for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Issuer")
            .field("cert_len", &self.cert_der.len())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// A signed certificate or request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    /// Shape of the template the artifact was signed from.
    pub kind: TemplateKind,
    /// DER encoding.
    #[serde(skip)]
    pub der: Vec<u8>,
}

impl Artifact {
    /// Returns the PEM label matching the artifact kind.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self.kind {
            TemplateKind::Leaf | TemplateKind::Ca => pem::CERTIFICATE,
            TemplateKind::Csr => pem::CERTIFICATE_REQUEST,
        }
    }

    /// Returns the PEM encoding.
    #[must_use]
    pub fn pem(&self) -> String {
        pem::encode(self.label(), &self.der)
    }
}

/// Signs templates into DER.
pub trait Signer {
    /// Signs a certificate template with its own key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`] if the template cannot be encoded or signed.
    fn self_sign(&self, template: &CertTemplate, key: &PrivateKey) -> Result<Vec<u8>>;

    /// Signs a certificate template for `key` with the issuer's key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`] if the template cannot be encoded or signed.
    fn sign_with_issuer(
        &self,
        template: &CertTemplate,
        key: &PrivateKey,
        issuer: &Issuer,
    ) -> Result<Vec<u8>>;

    /// Signs a certificate request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`] if the key is not usable for the request's
    /// signature algorithm or the request cannot be encoded.
    fn sign_request(&self, template: &CsrTemplate, key: &PrivateKey) -> Result<Vec<u8>>;
}

/// Signs any template shape, using `issuer` for certificates when given.
///
/// # Errors
///
/// Returns [`Error::Validation`] when an issuer is supplied for a request,
/// plus the errors of the [`Signer`] method used.
pub fn sign(
    signer: &dyn Signer,
    template: &CertificateTemplate,
    key: &PrivateKey,
    issuer: Option<&Issuer>,
) -> Result<Artifact> {
    let der = match (template, issuer) {
        (CertificateTemplate::Leaf(t) | CertificateTemplate::Ca(t), None) => {
            signer.self_sign(t, key)?
        }
        (CertificateTemplate::Leaf(t) | CertificateTemplate::Ca(t), Some(issuer)) => {
            signer.sign_with_issuer(t, key, issuer)?
        }
        (CertificateTemplate::Csr(t), None) => signer.sign_request(t, key)?,
        (CertificateTemplate::Csr(_), Some(_)) => {
            return Err(Error::Validation(
                "certificate requests cannot be signed by an issuer".into(),
            ));
        }
    };

    info!(
        kind = ?template.kind(),
        subject = %template.subject().common_name,
        bytes = der.len(),
        "signed artifact"
    );
    Ok(Artifact {
        kind: template.kind(),
        der,
    })
}

/// [`Signer`] backed by rcgen.
#[derive(Debug, Clone, Copy, Default)]
pub struct RcgenSigner;

impl Signer for RcgenSigner {
    fn self_sign(&self, template: &CertTemplate, key: &PrivateKey) -> Result<Vec<u8>> {
        let params = certificate_params(template)?;
        let key_pair = key.key_pair()?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| Error::Signing(format!("failed to self-sign certificate: {e}")))?;

        let name = encode_name(&template.subject)?;
        let der = with_names(cert.der(), name.clone(), name, key)?;
        debug!(subject = %template.subject.common_name, "self-signed certificate");
        Ok(der)
    }

    fn sign_with_issuer(
        &self,
        template: &CertTemplate,
        key: &PrivateKey,
        issuer: &Issuer,
    ) -> Result<Vec<u8>> {
        let params = certificate_params(template)?;
        let key_pair = key.key_pair()?;

        let issuer_key = issuer.key.key_pair()?;
        let issuer_params =
            CertificateParams::from_ca_cert_der(&CertificateDer::from(issuer.cert_der.as_slice()))
                .map_err(|e| Error::Signing(format!("failed to load issuer certificate: {e}")))?;
        let issuer_cert = issuer_params
            .self_signed(&issuer_key)
            .map_err(|e| Error::Signing(format!("failed to prepare issuer: {e}")))?;

        let cert = params
            .signed_by(&key_pair, &issuer_cert, &issuer_key)
            .map_err(|e| Error::Signing(format!("failed to sign certificate: {e}")))?;

        let issuer_name = x509_cert::Certificate::from_der(&issuer.cert_der)
            .map_err(|e| Error::Signing(format!("failed to read issuer name: {e}")))?
            .tbs_certificate
            .subject;
        let der = with_names(
            cert.der(),
            encode_name(&template.subject)?,
            issuer_name,
            &issuer.key,
        )?;
        debug!(subject = %template.subject.common_name, "issuer-signed certificate");
        Ok(der)
    }

    fn sign_request(&self, template: &CsrTemplate, key: &PrivateKey) -> Result<Vec<u8>> {
        if key.algorithm() != KeyAlgorithm::Rsa {
            return Err(Error::Signing(format!(
                "{:?} requests need an RSA key, got {}",
                template.signature_algorithm,
                key.algorithm()
            )));
        }

        let mut params = CertificateParams::default();
        params.distinguished_name = DistinguishedName::new();
        params.subject_alt_names =
            subject_alt_names(&template.ip_addresses, &template.dns_names)?;

        let key_pair = key.key_pair()?;
        let csr = params
            .serialize_request(&key_pair)
            .map_err(|e| Error::Signing(format!("failed to sign request: {e}")))?;

        let der = request_with_subject(csr.der(), encode_name(&template.subject)?, key)?;
        debug!(subject = %template.subject.common_name, "signed certificate request");
        Ok(der)
    }
}

fn certificate_params(template: &CertTemplate) -> Result<CertificateParams> {
    let mut params = CertificateParams::default();
    params.serial_number = Some(serial_number(template.serial));
    params.not_before = to_rcgen_time(template.not_before)?;
    params.not_after = to_rcgen_time(template.not_after)?;
    params.distinguished_name = DistinguishedName::new();
    params.subject_alt_names = subject_alt_names(&template.ip_addresses, &template.dns_names)?;

    params.key_usages = template
        .key_usage
        .iter()
        .map(|usage| match usage {
            KeyUsage::DigitalSignature => KeyUsagePurpose::DigitalSignature,
            KeyUsage::CertSign => KeyUsagePurpose::KeyCertSign,
        })
        .collect();
    params.extended_key_usages = template
        .ext_key_usage
        .iter()
        .map(|usage| match usage {
            ExtendedKeyUsage::ClientAuth => ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsage::ServerAuth => ExtendedKeyUsagePurpose::ServerAuth,
        })
        .collect();

    params.is_ca = match (template.basic_constraints_valid, template.is_ca) {
        (true, true) => IsCa::Ca(BasicConstraints::Unconstrained),
        (true, false) => IsCa::ExplicitNoCa,
        (false, _) => IsCa::NoCa,
    };

    Ok(params)
}

const OID_COMMON_NAME: &[u64] = &[2, 5, 4, 3];

/// Encodes the subject with one RDN per value, named attributes first in
/// [`NameAttribute::ALL`] order, then the common name, then extra attributes.
fn encode_name(subject: &Subject) -> Result<Name> {
    let mut rdns = Vec::new();
    for attribute in NameAttribute::ALL {
        for value in subject.values(attribute) {
            rdns.push(rdn(attribute.oid(), Tag::Utf8String, value)?);
        }
    }
    rdns.push(rdn(OID_COMMON_NAME, Tag::Utf8String, &subject.common_name)?);

    for extra in &subject.extra_attributes {
        if !extra.value.is_ascii() {
            return Err(Error::Signing(format!(
                "invalid attribute value '{}': not IA5",
                extra.value
            )));
        }
        rdns.push(rdn(&extra.oid, Tag::Ia5String, &extra.value)?);
    }
    Ok(RdnSequence(rdns))
}

fn rdn(arcs: &[u64], tag: Tag, value: &str) -> Result<RelativeDistinguishedName> {
    let dotted = arcs
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(".");
    let oid = ObjectIdentifier::new(&dotted)
        .map_err(|e| Error::Signing(format!("invalid attribute OID {dotted}: {e}")))?;
    let value = Any::new(tag, value.as_bytes())
        .map_err(|e| Error::Signing(format!("invalid attribute value '{value}': {e}")))?;
    let set = SetOfVec::try_from(vec![AttributeTypeAndValue { oid, value }])
        .map_err(|e| Error::Signing(format!("failed to encode RDN: {e}")))?;
    Ok(RelativeDistinguishedName(set))
}

/// Replaces the subject and issuer names of a certificate and re-signs it.
fn with_names(der: &[u8], subject: Name, issuer: Name, signing_key: &PrivateKey) -> Result<Vec<u8>> {
    let encoding = |e: x509_cert::der::Error| Error::Signing(format!("failed to encode certificate: {e}"));

    let mut cert = x509_cert::Certificate::from_der(der).map_err(encoding)?;
    cert.tbs_certificate.subject = subject;
    cert.tbs_certificate.issuer = issuer;
    let tbs = cert.tbs_certificate.to_der().map_err(encoding)?;
    cert.signature = BitString::from_bytes(&sign_message(signing_key, &tbs)?).map_err(encoding)?;
    cert.to_der().map_err(encoding)
}

/// Replaces the subject of a certificate request and re-signs it.
fn request_with_subject(der: &[u8], subject: Name, key: &PrivateKey) -> Result<Vec<u8>> {
    let encoding = |e: x509_cert::der::Error| Error::Signing(format!("failed to encode request: {e}"));

    let mut csr = CertReq::from_der(der).map_err(encoding)?;
    csr.info.subject = subject;
    let info = csr.info.to_der().map_err(encoding)?;
    csr.signature = BitString::from_bytes(&sign_message(key, &info)?).map_err(encoding)?;
    csr.to_der().map_err(encoding)
}

/// Signs with the scheme rcgen picks for the key, so the algorithm
/// identifiers already in the structure stay correct.
fn sign_message(key: &PrivateKey, message: &[u8]) -> Result<Vec<u8>> {
    let scheme = match key.algorithm() {
        KeyAlgorithm::Rsa => SignatureScheme::RSA_PKCS1_SHA256,
        KeyAlgorithm::EcdsaP256 => SignatureScheme::ECDSA_NISTP256_SHA256,
        KeyAlgorithm::EcdsaP384 => SignatureScheme::ECDSA_NISTP384_SHA384,
        KeyAlgorithm::Ed25519 => SignatureScheme::ED25519,
    };
    let der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.der().to_vec()));
    let signing_key = rustls::crypto::ring::sign::any_supported_type(&der)
        .map_err(|e| Error::Signing(format!("failed to load signing key: {e}")))?;
    let signer = signing_key
        .choose_scheme(&[scheme])
        .ok_or_else(|| Error::Signing(format!("{} key cannot sign with {scheme:?}", key.algorithm())))?;
    signer
        .sign(message)
        .map_err(|e| Error::Signing(format!("signature failed: {e}")))
}

fn subject_alt_names(ips: &[std::net::IpAddr], dns_names: &[String]) -> Result<Vec<SanType>> {
    let ips = ips.iter().map(|ip| Ok(SanType::IpAddress(*ip)));
    let dns = dns_names.iter().map(|dns| {
        let ia5 = Ia5String::try_from(dns.clone())
            .map_err(|e| Error::Signing(format!("invalid DNS name '{dns}': {e}")))?;
        Ok(SanType::DnsName(ia5))
    });
    ips.chain(dns).collect()
}

fn serial_number(serial: u64) -> SerialNumber {
    let bytes = serial.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    SerialNumber::from_slice(&bytes[start..])
}

/// Converts a chrono `DateTime` to rcgen `OffsetDateTime`.
fn to_rcgen_time(dt: DateTime<Utc>) -> Result<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp(dt.timestamp())
        .map_err(|e| Error::Signing(format!("invalid timestamp: {e}")))
}
