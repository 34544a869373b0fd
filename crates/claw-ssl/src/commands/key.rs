//! Private key generation.

use std::io::Write;

use claw_pki::{KeyProvider, PkiConfig, RsaKeyProvider};
use tracing::info;

use crate::cli::KeyArgs;
use crate::error::CliError;
use crate::output::{write_artifact, KeyReport, OutputFormat};

/// Key command executor.
pub struct KeyCommand<'a> {
    config: &'a PkiConfig,
}

impl<'a> KeyCommand<'a> {
    /// Create a new key command.
    #[must_use]
    pub const fn new(config: &'a PkiConfig) -> Self {
        Self { config }
    }

    /// Generate an RSA key and write it as PKCS#8 PEM.
    ///
    /// The key goes to `--out` when given, with a report on `writer`;
    /// otherwise the PEM itself goes to `writer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is below the configured minimum,
    /// generation fails, or the key cannot be written.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &KeyArgs,
    ) -> Result<(), CliError> {
        let provider = RsaKeyProvider::with_minimum(args.bits, self.config.min_rsa_bits)?;
        let key = provider.generate()?;
        write_artifact(writer, args.out.as_deref(), &key.pem())?;

        if let Some(path) = &args.out {
            info!(path = %path.display(), bits = args.bits, "wrote private key");
            let report = KeyReport {
                algorithm: key.algorithm().to_string(),
                bits: provider.bits(),
                path: path.display().to_string(),
            };
            format.write(writer, &report)?;
        }
        Ok(())
    }
}
