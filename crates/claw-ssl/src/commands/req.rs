//! Certificate request and CA creation.

use std::io::Write;

use claw_pki::{PkiConfig, TemplateKind};
use tracing::warn;

use super::issue;
use crate::cli::ReqArgs;
use crate::error::CliError;
use crate::output::OutputFormat;
use crate::prompt::Prompter;

/// Req command executor.
pub struct ReqCommand<'a> {
    config: &'a PkiConfig,
}

impl<'a> ReqCommand<'a> {
    /// Create a new req command.
    #[must_use]
    pub const fn new(config: &'a PkiConfig) -> Self {
        Self { config }
    }

    /// Template kind produced for the given flags.
    #[must_use]
    pub const fn kind(args: &ReqArgs) -> TemplateKind {
        if args.issue.is_ca {
            TemplateKind::Ca
        } else {
            TemplateKind::Csr
        }
    }

    /// Execute the req command: a self-signed CA with `--is-ca`, a CSR
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be read, the answers are invalid,
    /// or signing fails. CSRs require an RSA key.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        prompter: &mut dyn Prompter,
        args: &ReqArgs,
    ) -> Result<(), CliError> {
        let kind = Self::kind(args);
        if kind == TemplateKind::Csr && (args.issue.days.is_some() || args.issue.serial.is_some()) {
            warn!("--days and --serial do not apply to certificate requests");
        }
        issue(writer, format, self.config, prompter, kind, &args.issue, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Format, IssueArgs};
    use crate::prompt::LinePrompter;
    use claw_pki::{
        summarize_certificate, summarize_request, ChainVerifier, EcdsaKeyProvider, Error,
        KeyProvider, RsaKeyProvider, SourcedCertificate,
    };
    use std::fs;
    use std::path::{Path, PathBuf};

    // Common name, e-mail, then the seven name attributes.
    const ANSWERS: &[u8] = b"ca.local, api.local, 10.0.0.9\nops@example.com\nNZ\n\nAuckland\nAcme\nPlatform\n\n\n";

    fn rsa_key(dir: &Path) -> PathBuf {
        let path = dir.join("rsa.key");
        let key = RsaKeyProvider::new(2048).expect("provider").generate().expect("key");
        fs::write(&path, key.pem()).expect("write key");
        path
    }

    fn ec_key(dir: &Path) -> PathBuf {
        let path = dir.join("ec.key");
        let key = EcdsaKeyProvider.generate().expect("key");
        fs::write(&path, key.pem()).expect("write key");
        path
    }

    fn args(key: PathBuf, is_ca: bool) -> ReqArgs {
        ReqArgs {
            issue: IssueArgs {
                key,
                out: None,
                days: None,
                serial: None,
                is_ca,
            },
        }
    }

    fn run(args: &ReqArgs, answers: &[u8]) -> Result<Vec<u8>, CliError> {
        let config = PkiConfig::default();
        let mut prompter = LinePrompter::new(answers, std::io::sink());
        let mut buf = Vec::new();
        ReqCommand::new(&config).execute(&mut buf, &OutputFormat::new(Format::Table), &mut prompter, args)?;
        Ok(buf)
    }

    fn der(pem: &[u8]) -> Vec<u8> {
        let text = String::from_utf8(pem.to_vec()).expect("utf-8");
        claw_pki::pem::decode(&text).expect("pem").into_der()
    }

    #[test]
    fn kind_follows_is_ca() {
        assert_eq!(ReqCommand::kind(&args(PathBuf::new(), true)), TemplateKind::Ca);
        assert_eq!(ReqCommand::kind(&args(PathBuf::new(), false)), TemplateKind::Csr);
    }

    #[test]
    fn csr_carries_email_and_sans() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = run(&args(rsa_key(dir.path()), false), ANSWERS).expect("should execute");
        assert!(out.starts_with(b"-----BEGIN CERTIFICATE REQUEST-----"));

        let summary = summarize_request(&der(&out)).expect("request");
        assert_eq!(summary.email.as_deref(), Some("ops@example.com"));
        assert!(summary.subject.contains("ca.local"));
        assert!(summary.sans.contains(&"DNS:api.local".to_string()));
        assert!(summary.sans.contains(&"IP:10.0.0.9".to_string()));
        assert!(summary.signature_valid);
    }

    #[test]
    fn csr_requires_rsa_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = run(&args(ec_key(dir.path()), false), ANSWERS).unwrap_err();
        assert!(matches!(err, CliError::Pki(Error::Signing(_))));
    }

    #[test]
    fn csr_requires_email() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = run(&args(rsa_key(dir.path()), false), b"api.local\n\nNZ\n\n\n\n\n\n\n").unwrap_err();
        assert!(err.to_string().contains("E-mail address cannot be empty"));
    }

    #[test]
    fn ca_is_self_anchored_and_carries_sans() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = run(&args(ec_key(dir.path()), true), ANSWERS).expect("should execute");
        let pem = String::from_utf8(out.clone()).expect("utf-8");

        let summary = summarize_certificate(&der(&out)).expect("certificate");
        assert!(summary.is_ca);
        assert!(summary.sans.contains(&"DNS:api.local".to_string()));
        assert!(summary.sans.contains(&"IP:127.0.0.1".to_string()));

        let verified = ChainVerifier::new()
            .load_roots(&pem)
            .expect("roots")
            .expect_hostname(Some("api.local".into()))
            .with_certificate(SourcedCertificate {
                leaf: der(&out),
                presented_chain: Vec::new(),
                origin: "ca.pem".into(),
            })
            .verify()
            .expect("verifies");
        assert!(verified.self_anchored);
    }

    #[test]
    fn table_report_when_out_is_given() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut req_args = args(ec_key(dir.path()), true);
        req_args.issue.out = Some(dir.path().join("ca.pem"));

        let out = run(&req_args, ANSWERS).expect("should execute");
        let report = String::from_utf8(out).expect("utf-8");
        assert!(report.starts_with("CA Certificate"));
        assert!(report.contains("ca.pem"));
    }
}
