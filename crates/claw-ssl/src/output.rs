//! Output formatting for CLI commands.
//!
//! Reports render as a table (human-readable) or JSON. PEM artifacts are
//! written verbatim, either to stdout or to a private file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use claw_pki::{CertificateSummary, RequestSummary, TemplateKind, Verified};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Writes `contents` to `path` readable by the owner only, or to `writer`
/// when no path is given.
///
/// # Errors
///
/// Returns [`CliError::Pki`] naming the file if it cannot be written.
pub fn write_artifact<W: Write>(
    writer: &mut W,
    path: Option<&Path>,
    contents: &str,
) -> Result<(), CliError> {
    match path {
        Some(path) => write_private_file(path, contents.as_bytes()),
        None => {
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
            Ok(())
        }
    }
}

fn write_private_file(path: &Path, contents: &[u8]) -> Result<(), CliError> {
    let io_error = |e: std::io::Error| claw_pki::Error::io(path.display(), e);

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(io_error)?;

    // Mode only applies on creation; tighten files that already existed.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(io_error)?;
    }

    file.write_all(contents).map_err(io_error)?;
    file.sync_all().map_err(io_error)?;
    Ok(())
}

/// A freshly generated private key.
#[derive(Debug, Clone, Serialize)]
pub struct KeyReport {
    /// Key algorithm.
    pub algorithm: String,
    /// Key size in bits.
    pub bits: usize,
    /// Where the key was written.
    pub path: String,
}

impl TableDisplay for KeyReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Private Key")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Algorithm:        {}", self.algorithm)?;
        writeln!(writer, "Size:             {} bit", self.bits)?;
        writeln!(writer, "Written to:       {}", self.path)?;
        Ok(())
    }
}

/// A freshly signed certificate or request.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactReport {
    /// Template kind the artifact was built from.
    pub kind: TemplateKind,
    /// Subject distinguished name.
    pub subject: String,
    /// Serial number; absent for requests.
    pub serial: Option<String>,
    /// End of validity; absent for requests.
    pub not_after: Option<String>,
    /// SHA-256 fingerprint; absent for requests.
    pub fingerprint: Option<String>,
    /// Where the artifact was written.
    pub path: String,
}

impl ArtifactReport {
    /// Report for a signed certificate.
    #[must_use]
    pub fn certificate(kind: TemplateKind, summary: CertificateSummary, path: &Path) -> Self {
        Self {
            kind,
            subject: summary.subject,
            serial: Some(summary.serial),
            not_after: Some(summary.not_after.to_rfc3339()),
            fingerprint: Some(summary.fingerprint),
            path: path.display().to_string(),
        }
    }

    /// Report for a signed request.
    #[must_use]
    pub fn request(summary: RequestSummary, path: &Path) -> Self {
        Self {
            kind: TemplateKind::Csr,
            subject: summary.subject,
            serial: None,
            not_after: None,
            fingerprint: None,
            path: path.display().to_string(),
        }
    }
}

impl TableDisplay for ArtifactReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let title = match self.kind {
            TemplateKind::Leaf => "Certificate",
            TemplateKind::Ca => "CA Certificate",
            TemplateKind::Csr => "Certificate Request",
        };
        writeln!(writer, "{title}")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Subject:          {}", self.subject)?;
        if let Some(serial) = &self.serial {
            writeln!(writer, "Serial:           {serial}")?;
        }
        if let Some(not_after) = &self.not_after {
            writeln!(writer, "Not After:        {not_after}")?;
        }
        if let Some(fingerprint) = &self.fingerprint {
            writeln!(writer, "SHA-256:          {fingerprint}")?;
        }
        writeln!(writer, "Written to:       {}", self.path)?;
        Ok(())
    }
}

impl TableDisplay for Verified {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Certificate verification succeeds")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Source:           {}", self.origin)?;
        writeln!(writer, "Subject:          {}", self.subject)?;
        writeln!(
            writer,
            "Hostname:         {}",
            self.hostname.as_deref().unwrap_or("(not checked)")
        )?;
        writeln!(writer, "Path Length:      {}", self.path_length)?;
        if self.self_anchored {
            writeln!(writer, "Anchored:         certificate is a trust root")?;
        }
        Ok(())
    }
}

impl TableDisplay for CertificateSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Certificate")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Subject:          {}", self.subject)?;
        writeln!(writer, "Issuer:           {}", self.issuer)?;
        writeln!(writer, "Serial:           {}", self.serial)?;
        writeln!(writer, "Not Before:       {}", self.not_before.to_rfc3339())?;
        writeln!(writer, "Not After:        {}", self.not_after.to_rfc3339())?;
        writeln!(writer, "CA:               {}", if self.is_ca { "yes" } else { "no" })?;
        writeln!(writer, "Public Key:       {}", self.public_key)?;
        writeln!(writer, "Signature:        {}", self.signature_algorithm)?;
        writeln!(writer, "SHA-256:          {}", self.fingerprint)?;
        write_list(writer, "Subject Alt Names", &self.sans)?;
        write_list(writer, "Key Usage", &self.key_usage)?;
        write_list(writer, "Extended Key Usage", &self.ext_key_usage)?;
        Ok(())
    }
}

impl TableDisplay for RequestSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Certificate Request")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Subject:          {}", self.subject)?;
        writeln!(
            writer,
            "E-mail:           {}",
            self.email.as_deref().unwrap_or("-")
        )?;
        writeln!(writer, "Public Key:       {}", self.public_key)?;
        writeln!(writer, "Signature:        {}", self.signature_algorithm)?;
        writeln!(
            writer,
            "Self-Signature:   {}",
            if self.signature_valid { "valid" } else { "INVALID" }
        )?;
        write_list(writer, "Subject Alt Names", &self.sans)?;
        Ok(())
    }
}

/// Leaf certificate presented by a live endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteCertificate {
    /// `host:port` that was dialed.
    pub endpoint: String,
    /// Negotiated protocol version.
    pub protocol: Option<String>,
    /// Negotiated cipher suite.
    pub cipher_suite: Option<String>,
    /// Number of certificates the peer presented.
    pub chain_length: usize,
    /// The leaf certificate.
    pub certificate: CertificateSummary,
}

impl TableDisplay for RemoteCertificate {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Endpoint")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Address:          {}", self.endpoint)?;
        writeln!(
            writer,
            "Protocol:         {}",
            self.protocol.as_deref().unwrap_or("-")
        )?;
        writeln!(
            writer,
            "Cipher Suite:     {}",
            self.cipher_suite.as_deref().unwrap_or("-")
        )?;
        writeln!(writer, "Chain Length:     {}", self.chain_length)?;
        writeln!(writer)?;
        self.certificate.write_table(writer)
    }
}

fn write_list<W: Write>(writer: &mut W, title: &str, items: &[String]) -> Result<(), CliError> {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(writer)?;
    writeln!(writer, "{title}")?;
    for item in items {
        writeln!(writer, "  {item}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verified() -> Verified {
        Verified {
            origin: "leaf.pem".into(),
            subject: "CN=svc.local".into(),
            hostname: Some("svc.local".into()),
            path_length: 2,
            self_anchored: false,
        }
    }

    #[test]
    fn verified_table_output() {
        let fmt = OutputFormat::new(Format::Table);
        let output = fmt.to_string(&verified()).expect("should format");

        assert!(output.contains("Certificate verification succeeds"));
        assert!(output.contains("leaf.pem"));
        assert!(output.contains("svc.local"));
        assert!(!output.contains("Anchored"));
    }

    #[test]
    fn verified_json_output() {
        let fmt = OutputFormat::new(Format::Json);
        let output = fmt.to_string(&verified()).expect("should format");

        let parsed: serde_json::Value = serde_json::from_str(&output).expect("valid JSON");
        assert_eq!(parsed["origin"], "leaf.pem");
        assert_eq!(parsed["path_length"], 2);
        assert_eq!(parsed["self_anchored"], false);
    }

    #[test]
    fn request_report_omits_certificate_fields() {
        let report = ArtifactReport {
            kind: TemplateKind::Csr,
            subject: "CN=api.local".into(),
            serial: None,
            not_after: None,
            fingerprint: None,
            path: "req.pem".into(),
        };
        let output = OutputFormat::default().to_string(&report).expect("should format");

        assert!(output.starts_with("Certificate Request"));
        assert!(!output.contains("Serial"));

        let json = OutputFormat::new(Format::Json).to_string(&report).expect("should format");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");
        assert_eq!(parsed["kind"], "csr");
        assert!(parsed["serial"].is_null());
    }

    #[test]
    fn key_report_table_output() {
        let report = KeyReport {
            algorithm: "RSA".into(),
            bits: 2048,
            path: "key.pem".into(),
        };
        let output = OutputFormat::default().to_string(&report).expect("should format");
        assert!(output.contains("2048 bit"));
        assert!(output.contains("key.pem"));
    }

    #[test]
    fn artifact_goes_to_writer_without_path() {
        let mut buf = Vec::new();
        write_artifact(&mut buf, None, "-----BEGIN X-----\n").expect("should write");
        assert_eq!(buf, b"-----BEGIN X-----\n");
    }

    #[test]
    fn artifact_file_is_private() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("key.pem");
        fs::write(&path, "stale contents that are longer").expect("seed file");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("seed mode");
        }

        let mut buf = Vec::new();
        write_artifact(&mut buf, Some(&path), "fresh").expect("should write");

        assert!(buf.is_empty());
        assert_eq!(fs::read_to_string(&path).expect("read back"), "fresh");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn unwritable_artifact_names_the_file() {
        let mut buf = Vec::new();
        let err = write_artifact(&mut buf, Some(Path::new("/nonexistent/dir/out.pem")), "x")
            .unwrap_err();
        assert!(err.to_string().contains("out.pem"));
    }
}
