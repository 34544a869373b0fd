//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`key`] - RSA key generation
//! - [`cert`] - Self-signed and CA-signed certificates
//! - [`req`] - Certificate requests and CA certificates
//! - [`verify`] - Chain verification against a CA file
//! - [`info`] - Certificate and request inspection

pub mod cert;
pub mod info;
pub mod key;
pub mod req;
pub mod verify;

pub use cert::CertCommand;
pub use info::InfoCommand;
pub use key::KeyCommand;
pub use req::ReqCommand;
pub use verify::VerifyCommand;

use std::fs;
use std::io::Write;
use std::path::Path;

use claw_pki::{
    build_subject, questions, sign, summarize_certificate, summarize_request,
    ClientIdentity, Issuer, PkiConfig, PrivateKey, RcgenSigner, TemplateDefaults,
    TemplateFactory, TemplateKind, TemplateRequest, TlsTransport,
};
use tracing::info;

use crate::cli::{ClientAuthArgs, IssueArgs};
use crate::error::CliError;
use crate::output::{write_artifact, ArtifactReport, OutputFormat};
use crate::prompt::Prompter;

/// Reads a text file, naming it on failure.
pub(crate) fn read_text(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|e| claw_pki::Error::io(path.display(), e).into())
}

/// Prompts for a subject, signs a `kind` template and writes the PEM.
pub(crate) fn issue<W: Write>(
    writer: &mut W,
    format: &OutputFormat,
    config: &PkiConfig,
    prompter: &mut dyn Prompter,
    kind: TemplateKind,
    args: &IssueArgs,
    issuer: Option<&Issuer>,
) -> Result<(), CliError> {
    let key_origin = args.key.display().to_string();
    let key = PrivateKey::from_pem(&read_text(&args.key)?, &key_origin)?;

    let answers = prompter.ask_all(questions(kind))?;
    let answers = build_subject(kind, &answers)?;

    let factory = TemplateFactory::new(TemplateDefaults::from(config));
    let template = factory.build(
        kind,
        TemplateRequest {
            subject: answers.subject,
            sans: answers.sans,
            days: args.days.unwrap_or(config.default_days),
            serial: Some(args.serial.unwrap_or(config.default_serial)),
            is_ca: args.is_ca || kind == TemplateKind::Ca,
        },
    )?;
    let artifact = sign(&RcgenSigner, &template, &key, issuer)?;
    write_artifact(writer, args.out.as_deref(), &artifact.pem())?;

    if let Some(path) = &args.out {
        info!(path = %path.display(), kind = ?kind, "wrote artifact");
        let report = if kind == TemplateKind::Csr {
            ArtifactReport::request(summarize_request(&artifact.der)?, path)
        } else {
            ArtifactReport::certificate(kind, summarize_certificate(&artifact.der)?, path)
        };
        format.write(writer, &report)?;
    }
    Ok(())
}

/// Rejects client credentials unless the target is a `--url`.
pub(crate) fn check_client_auth(client: &ClientAuthArgs, url: Option<&str>) -> Result<(), CliError> {
    if url.is_none() && (client.client_cert.is_some() || client.client_key.is_some()) {
        return Err(CliError::InvalidArgument(
            "--client-cert and --client-key only apply to --url targets".into(),
        ));
    }
    Ok(())
}

/// Builds the TLS transport for `--url` targets, with client credentials
/// when given.
pub(crate) fn transport(
    config: &PkiConfig,
    client: &ClientAuthArgs,
    url: Option<&str>,
) -> Result<TlsTransport, CliError> {
    check_client_auth(client, url)?;
    let transport = TlsTransport::from_config(config);
    match (&client.client_cert, &client.client_key) {
        (Some(cert), Some(key)) => {
            let identity = ClientIdentity::from_pem(&read_text(cert)?, &read_text(key)?)?;
            Ok(transport.with_identity(identity))
        }
        (None, None) => Ok(transport),
        _ => Err(CliError::InvalidArgument(
            "--client-cert and --client-key must be given together".into(),
        )),
    }
}
