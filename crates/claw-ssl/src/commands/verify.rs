//! Chain verification against a CA file.

use std::io::Write;

use claw_pki::{CertificateSource, ChainVerifier, PkiConfig, Transport};
use tracing::info;

use super::{check_client_auth, read_text, transport};
use crate::cli::VerifyArgs;
use crate::error::CliError;
use crate::output::OutputFormat;

/// Verify command executor.
pub struct VerifyCommand<'a> {
    config: &'a PkiConfig,
}

impl<'a> VerifyCommand<'a> {
    /// Create a new verify command.
    #[must_use]
    pub const fn new(config: &'a PkiConfig) -> Self {
        Self { config }
    }

    /// Execute the verify command over a TLS transport built from config.
    ///
    /// # Errors
    ///
    /// Returns an error if the CA file has no usable root, the certificate
    /// cannot be sourced, or verification fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &VerifyArgs,
    ) -> Result<(), CliError> {
        let transport = transport(self.config, &args.client, args.url.as_deref())?;
        self.execute_with(writer, format, args, &transport)
    }

    /// Execute the verify command over the given transport.
    ///
    /// # Errors
    ///
    /// See [`VerifyCommand::execute`].
    pub fn execute_with<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &VerifyArgs,
        transport: &dyn Transport,
    ) -> Result<(), CliError> {
        check_client_auth(&args.client, args.url.as_deref())?;
        let source = match (&args.cert_file, &args.url) {
            (Some(path), None) => CertificateSource::file(path),
            (None, Some(url)) => CertificateSource::url(url)?,
            _ => {
                return Err(CliError::InvalidArgument(
                    "exactly one of --cert-file and --url is required".into(),
                ));
            }
        };
        if args.url.is_some() && args.dns.is_some() {
            return Err(CliError::InvalidArgument(
                "--dns cannot be combined with --url; the URL host is checked".into(),
            ));
        }

        let verified = ChainVerifier::new()
            .load_roots(&read_text(&args.ca_file)?)?
            .expect_hostname(args.dns.clone())
            .source(&source, transport)?
            .verify()?;

        info!(origin = %verified.origin, "certificate verification succeeds");
        format.write(writer, &verified)?;
        Ok(())
    }
}
