//! Certificate and request inspection.

use std::io::Write;

use claw_pki::inspect::read_request_file;
use claw_pki::source::read_certificate_file;
use claw_pki::{summarize_certificate, summarize_request, Endpoint, PkiConfig, Transport};
use serde::Serialize;
use tracing::debug;

use super::{check_client_auth, transport};
use crate::cli::InfoArgs;
use crate::error::CliError;
use crate::output::{write_artifact, OutputFormat, RemoteCertificate, TableDisplay};

/// Info command executor.
pub struct InfoCommand<'a> {
    config: &'a PkiConfig,
}

impl<'a> InfoCommand<'a> {
    /// Create a new info command.
    #[must_use]
    pub const fn new(config: &'a PkiConfig) -> Self {
        Self { config }
    }

    /// Execute the info command over a TLS transport built from config.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be read or parsed, the
    /// handshake fails, or the report cannot be written.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &InfoArgs,
    ) -> Result<(), CliError> {
        let transport = transport(self.config, &args.client, args.url.as_deref())?;
        self.execute_with(writer, format, args, &transport)
    }

    /// Execute the info command over the given transport.
    ///
    /// # Errors
    ///
    /// See [`InfoCommand::execute`].
    pub fn execute_with<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &InfoArgs,
        transport: &dyn Transport,
    ) -> Result<(), CliError> {
        check_client_auth(&args.client, args.url.as_deref())?;
        match (&args.cert, &args.csr, &args.url) {
            (Some(path), None, None) => {
                let sourced = read_certificate_file(path)?;
                let summary = summarize_certificate(&sourced.leaf)?;
                emit(writer, format, args, &summary)
            }
            (None, Some(path), None) => {
                let der = read_request_file(path)?;
                let summary = summarize_request(&der)?;
                emit(writer, format, args, &summary)
            }
            (None, None, Some(url)) => {
                let endpoint = Endpoint::parse(url)?;
                let session = transport.handshake(&endpoint)?;
                let Some(leaf) = session.chain.first() else {
                    return Err(claw_pki::Error::Handshake(format!(
                        "no certificate returned from {endpoint}"
                    ))
                    .into());
                };
                debug!(%endpoint, chain = session.chain.len(), "captured peer chain");
                let report = RemoteCertificate {
                    endpoint: endpoint.to_string(),
                    protocol: session.protocol.clone(),
                    cipher_suite: session.cipher_suite.clone(),
                    chain_length: session.chain.len(),
                    certificate: summarize_certificate(leaf)?,
                };
                emit(writer, format, args, &report)
            }
            _ => Err(CliError::InvalidArgument(
                "exactly one of --cert, --csr and --url is required".into(),
            )),
        }
    }
}

/// Writes the report to `--out` when given, otherwise to `writer`.
fn emit<W, T>(writer: &mut W, format: &OutputFormat, args: &InfoArgs, value: &T) -> Result<(), CliError>
where
    W: Write,
    T: Serialize + TableDisplay,
{
    let rendered = format.to_string(value)?;
    write_artifact(writer, args.out.as_deref(), &rendered)
}
