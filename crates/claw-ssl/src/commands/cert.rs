//! Certificate creation.
//!
//! Prompts for the certificate subject and produces a leaf certificate,
//! self-signed or signed by the CA given with `--ca-cert`/`--ca-key`.

use std::io::Write;

use claw_pki::{Issuer, PkiConfig, TemplateKind};

use super::{issue, read_text};
use crate::cli::CertArgs;
use crate::error::CliError;
use crate::output::OutputFormat;
use crate::prompt::Prompter;

/// Cert command executor.
pub struct CertCommand<'a> {
    config: &'a PkiConfig,
}

impl<'a> CertCommand<'a> {
    /// Create a new cert command.
    #[must_use]
    pub const fn new(config: &'a PkiConfig) -> Self {
        Self { config }
    }

    /// Execute the cert command.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read, the answers are invalid,
    /// the issuer key does not match its certificate, or signing fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        prompter: &mut dyn Prompter,
        args: &CertArgs,
    ) -> Result<(), CliError> {
        let issuer = match (&args.ca_cert, &args.ca_key) {
            (Some(cert), Some(key)) => Some(Issuer::from_pem(&read_text(cert)?, &read_text(key)?)?),
            (None, None) => None,
            _ => {
                return Err(CliError::InvalidArgument(
                    "--ca-cert and --ca-key must be given together".into(),
                ));
            }
        };

        issue(
            writer,
            format,
            self.config,
            prompter,
            TemplateKind::Leaf,
            &args.issue,
            issuer.as_ref(),
        )
    }
}
