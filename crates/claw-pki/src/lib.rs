//! PKI template construction and chain verification for clawssl.
//!
//! This crate builds X.509 certificate templates (self-signed leaf, CA,
//! CA-signed leaf, certificate signing request), signs them into PEM
//! artifacts, and verifies certificate chains against trust roots with
//! optional hostname binding.
//!
//! # Overview
//!
//! Issuance flows `subject -> template -> signer -> PEM`:
//! - [`build_subject`] turns prompted answers into a [`Subject`] and SANs
//! - [`TemplateFactory`] produces a [`CertificateTemplate`] per [`TemplateKind`]
//! - a [`Signer`] turns the template and a [`PrivateKey`] into an [`Artifact`]
//!
//! Verification flows `source -> verifier -> result`:
//! - a [`CertificateSource`] reads a PEM file or captures a peer chain over TLS
//! - [`ChainVerifier`] builds a path to the CA roots and checks the hostname
//!
//! # Example
//!
//! ```
//! use claw_pki::{
//!     sign, ChainVerifier, EcdsaKeyProvider, KeyProvider, RcgenSigner, SourcedCertificate, Subject,
//!     TemplateFactory,
//! };
//!
//! let key = EcdsaKeyProvider.generate().unwrap();
//! let template = TemplateFactory::default()
//!     .build_ca(Subject::new("Example Root"), &["root.example"], 30, None)
//!     .unwrap();
//! let ca = sign(&RcgenSigner, &template, &key, None).unwrap();
//!
//! let verified = ChainVerifier::new()
//!     .load_roots(&ca.pem())
//!     .unwrap()
//!     .expect_hostname(Some("root.example".into()))
//!     .with_certificate(SourcedCertificate {
//!         leaf: ca.der.clone(),
//!         presented_chain: Vec::new(),
//!         origin: "ca.pem".into(),
//!     })
//!     .verify()
//!     .unwrap();
//! assert!(verified.self_anchored);
//! ```
//!
//! # Modules
//!
//! - [`subject`] - Subject construction from prompted answers
//! - [`san`] - SAN classification
//! - [`template`] - Certificate templates
//! - [`keys`] - Private keys and key generation
//! - [`signer`] - Signing templates into DER
//! - [`pem`] - PEM codec boundary
//! - [`source`] - Certificate sources
//! - [`transport`] - Live TLS handshakes
//! - [`verify`] - Chain verification
//! - [`inspect`] - Certificate and request summaries
//! - [`clock`] - Wall-clock capability
//! - [`config`] - Tool configuration
//! - [`error`] - Error types

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod error;
pub mod inspect;
pub mod keys;
pub mod pem;
pub mod san;
pub mod signer;
pub mod source;
pub mod subject;
pub mod template;
pub mod transport;
pub mod verify;

// Re-export commonly used types at crate root
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::PkiConfig;
pub use error::{Error, FailureReason, Result};
pub use inspect::{summarize_certificate, summarize_request, CertificateSummary, RequestSummary};
pub use keys::{EcdsaKeyProvider, KeyAlgorithm, KeyProvider, PrivateKey, RsaKeyProvider};
pub use san::{classify, ClassifiedSans};
pub use signer::{sign, Artifact, Issuer, RcgenSigner, Signer};
pub use source::{CertificateSource, Endpoint, SourcedCertificate};
pub use subject::{build_subject, questions, Subject, SubjectAnswers};
pub use template::{
    CertTemplate, CertificateTemplate, CsrTemplate, TemplateDefaults, TemplateFactory,
    TemplateKind, TemplateRequest,
};
pub use transport::{ClientIdentity, PeerSession, TlsTransport, Transport};
pub use verify::{ChainVerifier, TrustContext, Verified};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request_answers(cn: &str) -> Vec<String> {
        let mut answers = vec![cn.to_string(), "ops@example.com".to_string()];
        answers.extend(["NZ", "", "Auckland", "Acme", "", "", ""].map(String::from));
        answers
    }

    #[test]
    fn full_workflow_test() {
        let factory = TemplateFactory::default();

        // 1. CA from prompted answers
        let answers = build_subject(TemplateKind::Ca, &request_answers("root.example")).unwrap();
        let ca_template = factory
            .build(
                TemplateKind::Ca,
                TemplateRequest {
                    subject: answers.subject,
                    sans: answers.sans,
                    days: 365,
                    serial: None,
                    is_ca: true,
                },
            )
            .unwrap();
        let ca_key = EcdsaKeyProvider.generate().unwrap();
        let ca = sign(&RcgenSigner, &ca_template, &ca_key, None).unwrap();

        // 2. Leaf signed by the CA
        let leaf_answers = ["svc.example", "NZ", "", "", "Acme", "", "", ""];
        let leaf_subject = build_subject(TemplateKind::Leaf, &leaf_answers).unwrap();
        let leaf_template = factory
            .build_leaf(leaf_subject.subject, 90, Some(2), false)
            .unwrap();
        let issuer = Issuer::from_pem(&ca.pem(), &ca_key.pem()).unwrap();
        let leaf_key = EcdsaKeyProvider.generate().unwrap();
        let leaf = sign(&RcgenSigner, &leaf_template, &leaf_key, Some(&issuer)).unwrap();

        // 3. PEM round trip through the file codec
        let block = pem::decode(&leaf.pem()).unwrap();
        assert_eq!(block.der(), leaf.der.as_slice());

        // 4. Verify against the CA with the loopback default SAN
        let verified = ChainVerifier::new()
            .load_roots(&ca.pem())
            .unwrap()
            .expect_hostname(Some("127.0.0.1".into()))
            .with_certificate(SourcedCertificate {
                leaf: leaf.der.clone(),
                presented_chain: Vec::new(),
                origin: "leaf.pem".into(),
            })
            .verify()
            .unwrap();
        assert_eq!(verified.path_length, 2);

        // 5. Summaries
        let summary = summarize_certificate(&leaf.der).unwrap();
        assert!(summary.issuer.contains("root.example"));
        assert!(!summary.is_ca);
    }

    #[test]
    fn request_workflow() {
        let answers = build_subject(TemplateKind::Csr, &request_answers("api.example, 10.0.0.5"))
            .unwrap();
        let template = TemplateFactory::default()
            .build(
                TemplateKind::Csr,
                TemplateRequest {
                    subject: answers.subject,
                    sans: answers.sans,
                    days: 0,
                    serial: None,
                    is_ca: false,
                },
            )
            .unwrap();
        let key = RsaKeyProvider::new(2048).unwrap().generate().unwrap();
        let csr = sign(&RcgenSigner, &template, &key, None).unwrap();

        let summary = summarize_request(&csr.der).unwrap();
        assert_eq!(summary.email.as_deref(), Some("ops@example.com"));
        assert!(summary.sans.contains(&"IP:10.0.0.5".to_string()));
        assert!(summary.signature_valid);
    }

    #[test]
    fn remote_verification_workflow() {
        let factory = TemplateFactory::default();
        let ca_key = EcdsaKeyProvider.generate().unwrap();
        let ca_template = factory
            .build_ca(Subject::new("Remote Root"), &["root.local"], 30, None)
            .unwrap();
        let ca = sign(&RcgenSigner, &ca_template, &ca_key, None).unwrap();
        let issuer = Issuer::new(ca.der.clone(), ca_key).unwrap();

        let leaf_key = EcdsaKeyProvider.generate().unwrap();
        let leaf_template = factory
            .build_leaf(Subject::new("localhost"), 10, None, false)
            .unwrap();
        let leaf = sign(&RcgenSigner, &leaf_template, &leaf_key, Some(&issuer)).unwrap();

        let (port, server) = transport::test_server::serve_once(vec![leaf.der.clone()], &leaf_key);
        let transport = TlsTransport::new(Duration::from_secs(5));
        let verified = ChainVerifier::new()
            .load_roots(&ca.pem())
            .unwrap()
            .source(&CertificateSource::Remote(Endpoint::new("127.0.0.1", port)), &transport)
            .unwrap()
            .verify()
            .unwrap();
        server.join().unwrap();

        assert_eq!(verified.hostname.as_deref(), Some("127.0.0.1"));
        assert_eq!(verified.origin, format!("127.0.0.1:{port}"));
    }
}
