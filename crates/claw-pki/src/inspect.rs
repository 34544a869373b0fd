//! Human-readable summaries of certificates and requests.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::oid_registry::Oid;
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::public_key::PublicKey;
use x509_parser::x509::{SubjectPublicKeyInfo, X509Name};

use crate::error::{Error, Result};
use crate::pem;
use crate::subject::OID_EMAIL_ADDRESS;
use crate::template::{ExtendedKeyUsage, SignatureAlgorithm};

/// Summary of an X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateSummary {
    /// Subject distinguished name.
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Serial number as colon-separated hex, without DER sign padding.
    pub serial: String,
    /// Start of validity.
    pub not_before: DateTime<Utc>,
    /// End of validity.
    pub not_after: DateTime<Utc>,
    /// Subject alternative names, prefixed with their type.
    pub sans: Vec<String>,
    /// Whether basic constraints mark this a CA.
    pub is_ca: bool,
    /// Key usage flags.
    pub key_usage: Vec<String>,
    /// Extended key usage purposes.
    pub ext_key_usage: Vec<String>,
    /// Signature algorithm name or OID.
    pub signature_algorithm: String,
    /// Public key algorithm and size.
    pub public_key: String,
    /// SHA-256 fingerprint of the DER encoding.
    pub fingerprint: String,
}

/// Summary of a PKCS#10 certificate request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSummary {
    /// Subject distinguished name.
    pub subject: String,
    /// PKCS#9 e-mail attribute, if present.
    pub email: Option<String>,
    /// Requested subject alternative names.
    pub sans: Vec<String>,
    /// Signature algorithm name or OID.
    pub signature_algorithm: String,
    /// Public key algorithm and size.
    pub public_key: String,
    /// Whether the request's self-signature verifies.
    pub signature_valid: bool,
}

/// Summarizes a DER certificate.
///
/// # Errors
///
/// Returns [`Error::Parse`] if `der` is not a certificate.
pub fn summarize_certificate(der: &[u8]) -> Result<CertificateSummary> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| Error::Parse(format!("invalid certificate: {e}")))?;

    let sans = cert
        .subject_alternative_name()
        .map_err(|e| Error::Parse(format!("invalid SAN extension: {e}")))?
        .map(|ext| ext.value.general_names.iter().map(general_name).collect())
        .unwrap_or_default();

    let mut key_usage = Vec::new();
    if let Ok(Some(ext)) = cert.key_usage() {
        let ku = ext.value;
        let flags = [
            (ku.digital_signature(), "Digital Signature"),
            (ku.non_repudiation(), "Non Repudiation"),
            (ku.key_encipherment(), "Key Encipherment"),
            (ku.data_encipherment(), "Data Encipherment"),
            (ku.key_agreement(), "Key Agreement"),
            (ku.key_cert_sign(), "Certificate Sign"),
            (ku.crl_sign(), "CRL Sign"),
        ];
        key_usage = flags
            .into_iter()
            .filter(|(set, _)| *set)
            .map(|(_, name)| name.to_string())
            .collect();
    }

    let mut ext_key_usage = Vec::new();
    if let Ok(Some(ext)) = cert.extended_key_usage() {
        let eku = ext.value;
        if eku.server_auth {
            ext_key_usage.push(format!(
                "TLS Web Server Authentication ({})",
                ExtendedKeyUsage::ServerAuth.oid()
            ));
        }
        if eku.client_auth {
            ext_key_usage.push(format!(
                "TLS Web Client Authentication ({})",
                ExtendedKeyUsage::ClientAuth.oid()
            ));
        }
        ext_key_usage.extend(eku.other.iter().map(Oid::to_id_string));
    }

    let validity = cert.validity();
    Ok(CertificateSummary {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial: format_serial(cert.raw_serial()),
        not_before: to_chrono(validity.not_before.timestamp()),
        not_after: to_chrono(validity.not_after.timestamp()),
        sans,
        is_ca: cert.is_ca(),
        key_usage,
        ext_key_usage,
        signature_algorithm: signature_algorithm_name(&cert.signature_algorithm.algorithm),
        public_key: public_key_description(cert.public_key()),
        fingerprint: fingerprint(der),
    })
}

/// Summarizes a DER certificate request.
///
/// # Errors
///
/// Returns [`Error::Parse`] if `der` is not a certificate request.
pub fn summarize_request(der: &[u8]) -> Result<RequestSummary> {
    let (_, csr) = X509CertificationRequest::from_der(der)
        .map_err(|e| Error::Parse(format!("invalid certificate request: {e}")))?;
    let info = &csr.certification_request_info;

    let sans = csr
        .requested_extensions()
        .into_iter()
        .flatten()
        .filter_map(|ext| match ext {
            ParsedExtension::SubjectAlternativeName(san) => Some(san),
            _ => None,
        })
        .flat_map(|san| san.general_names.iter().map(general_name))
        .collect();

    Ok(RequestSummary {
        subject: info.subject.to_string(),
        email: email_attribute(&info.subject),
        sans,
        signature_algorithm: signature_algorithm_name(&csr.signature_algorithm.algorithm),
        public_key: public_key_description(&info.subject_pki),
        signature_valid: csr.verify_signature().is_ok(),
    })
}

/// Reads a single-request PEM file and returns its DER.
///
/// # Errors
///
/// Returns [`Error::Io`], [`Error::Decode`] or [`Error::Parse`], each naming
/// the file.
pub fn read_request_file(path: &Path) -> Result<Vec<u8>> {
    let origin = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|e| Error::io(&origin, e))?;
    let block = pem::decode(&text).map_err(|e| Error::Decode(format!("{origin}: {e}")))?;
    if block.label() != pem::CERTIFICATE_REQUEST {
        return Err(Error::Decode(format!(
            "{origin}: expected a CERTIFICATE REQUEST block, found '{}'",
            block.label()
        )));
    }
    X509CertificationRequest::from_der(block.der())
        .map_err(|e| Error::Parse(format!("{origin}: invalid certificate request: {e}")))?;
    Ok(block.into_der())
}

fn email_attribute(name: &X509Name<'_>) -> Option<String> {
    name.iter_attributes()
        .find(|attr| {
            attr.attr_type()
                .iter()
                .is_some_and(|arcs| arcs.eq(OID_EMAIL_ADDRESS.iter().copied()))
        })
        .and_then(|attr| attr.as_str().ok())
        .map(String::from)
}

fn general_name(name: &GeneralName<'_>) -> String {
    match name {
        GeneralName::DNSName(dns) => format!("DNS:{dns}"),
        GeneralName::IPAddress(bytes) => match ip_from_bytes(bytes) {
            Some(ip) => format!("IP:{ip}"),
            None => format!("IP:{bytes:02x?}"),
        },
        GeneralName::RFC822Name(email) => format!("email:{email}"),
        GeneralName::URI(uri) => format!("URI:{uri}"),
        other => format!("{other:?}"),
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(|b| IpAddr::V4(Ipv4Addr::from(b))),
        16 => <[u8; 16]>::try_from(bytes).ok().map(|b| IpAddr::V6(Ipv6Addr::from(b))),
        _ => None,
    }
}

fn signature_algorithm_name(oid: &Oid<'_>) -> String {
    let id = oid.to_id_string();
    let name = match id.as_str() {
        s if s == SignatureAlgorithm::Sha256WithRsa.oid() => "sha256WithRSAEncryption",
        "1.2.840.113549.1.1.12" => "sha384WithRSAEncryption",
        "1.2.840.113549.1.1.13" => "sha512WithRSAEncryption",
        "1.2.840.10045.4.3.2" => "ecdsa-with-SHA256",
        "1.2.840.10045.4.3.3" => "ecdsa-with-SHA384",
        "1.3.101.112" => "ED25519",
        _ => return id,
    };
    name.to_string()
}

fn public_key_description(spki: &SubjectPublicKeyInfo<'_>) -> String {
    match spki.parsed() {
        Ok(PublicKey::RSA(rsa)) => format!("RSA ({} bit)", rsa.key_size()),
        Ok(PublicKey::EC(point)) => format!("EC ({} bit)", point.key_size()),
        Ok(_) | Err(_) => spki.algorithm.algorithm.to_id_string(),
    }
}

fn fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Formats a DER INTEGER serial by magnitude.
///
/// The leading zero DER adds to keep a high-bit serial positive is dropped,
/// so serial 0x80 reads `80` rather than `00:80`.
fn format_serial(raw: &[u8]) -> String {
    let bytes = match raw {
        [0, rest @ ..] if rest.first().is_some_and(|b| b & 0x80 != 0) => rest,
        _ => raw,
    };
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

fn to_chrono(timestamp: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{EcdsaKeyProvider, KeyProvider, RsaKeyProvider};
    use crate::signer::{sign, RcgenSigner};
    use crate::subject::Subject;
    use crate::template::TemplateFactory;
    use std::io::Write;
    use test_case::test_case;

    #[test]
    fn summarizes_ca_certificate() {
        let key = EcdsaKeyProvider.generate().unwrap();
        let template = TemplateFactory::default()
            .build_ca(Subject::new("ca.local"), &["ca.local", "10.0.0.9"], 30, Some(0xAB))
            .unwrap();
        let der = sign(&RcgenSigner, &template, &key, None).unwrap().der;

        let summary = summarize_certificate(&der).unwrap();
        assert!(summary.subject.contains("CN=ca.local"));
        assert_eq!(summary.subject, summary.issuer);
        assert_eq!(summary.serial, "ab");
        assert!(summary.is_ca);
        assert!(summary.sans.contains(&"DNS:ca.local".to_string()));
        assert!(summary.sans.contains(&"IP:10.0.0.9".to_string()));
        assert!(summary.sans.contains(&"IP:::1".to_string()));
        assert!(summary.key_usage.contains(&"Certificate Sign".to_string()));
        assert_eq!(summary.ext_key_usage.len(), 2);
        assert_eq!(summary.signature_algorithm, "ecdsa-with-SHA256");
        assert!(summary.public_key.starts_with("EC"));
        assert_eq!(summary.fingerprint.split(':').count(), 32);
        assert_eq!((summary.not_after - summary.not_before).num_days(), 30);
    }

    #[test_case(&[0x7f], "7f" ; "high bit clear")]
    #[test_case(&[0x00, 0x80], "80" ; "sign padding dropped")]
    #[test_case(&[0x00, 0xab, 0x01], "ab:01" ; "multi byte padded")]
    #[test_case(&[0x01, 0x00], "01:00" ; "interior zero kept")]
    #[test_case(&[0x00], "00" ; "zero")]
    fn serial_formatting(raw: &[u8], expected: &str) {
        assert_eq!(format_serial(raw), expected);
    }

    #[test]
    fn high_bit_serials_survive_signing() {
        let key = EcdsaKeyProvider.generate().unwrap();
        for (serial, expected) in [(0x7F, "7f"), (0x80, "80")] {
            let template = TemplateFactory::default()
                .build_leaf(Subject::new("serial.local"), 1, Some(serial), false)
                .unwrap();
            let der = sign(&RcgenSigner, &template, &key, None).unwrap().der;
            assert_eq!(summarize_certificate(&der).unwrap().serial, expected);
        }
    }

    #[test]
    fn summarizes_request() {
        let key = RsaKeyProvider::new(2048).unwrap().generate().unwrap();
        let template = TemplateFactory::default()
            .build_csr(Subject::new("api.local"), &["api.local"], "ops@example.com")
            .unwrap();
        let der = sign(&RcgenSigner, &template, &key, None).unwrap().der;

        let summary = summarize_request(&der).unwrap();
        assert!(summary.subject.contains("CN=api.local"));
        assert_eq!(summary.email.as_deref(), Some("ops@example.com"));
        assert_eq!(summary.sans, vec!["DNS:api.local"]);
        assert_eq!(summary.signature_algorithm, "sha256WithRSAEncryption");
        assert_eq!(summary.public_key, "RSA (2048 bit)");
        assert!(summary.signature_valid);
    }

    #[test]
    fn garbage_is_parse_error() {
        assert!(matches!(summarize_certificate(b"junk"), Err(Error::Parse(_))));
        assert!(matches!(summarize_request(b"junk"), Err(Error::Parse(_))));
    }

    #[test]
    fn request_file_must_hold_a_request() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(pem::encode(pem::CERTIFICATE, b"x").as_bytes())
            .unwrap();
        let result = read_request_file(file.path());
        assert!(matches!(result, Err(Error::Decode(_))));
    }
}
