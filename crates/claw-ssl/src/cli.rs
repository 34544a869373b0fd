//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

/// clawssl - keys, certificates, requests and chain verification.
#[derive(Parser, Debug, Clone)]
#[command(name = "clawssl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format for reports.
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// JSON configuration file.
    #[arg(short, long, global = true, env = "CLAWSSL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Generate an RSA private key.
    Key(KeyArgs),

    /// Create a self-signed or CA-signed certificate.
    Cert(CertArgs),

    /// Create a certificate signing request, or a CA with --is-ca.
    Req(ReqArgs),

    /// Verify a certificate against a CA file.
    Verify(VerifyArgs),

    /// Show the contents of a certificate or request.
    Info(InfoArgs),
}

/// Arguments for `key`.
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// Key size in bits.
    pub bits: usize,

    /// Write the key here instead of stdout.
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

/// Validity, serial and destination shared by `cert` and `req`.
#[derive(Args, Debug, Clone)]
pub struct IssueArgs {
    /// Private key file (PEM).
    #[arg(short, long)]
    pub key: PathBuf,

    /// Write the artifact here instead of stdout.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Validity period in days.
    #[arg(long)]
    pub days: Option<u32>,

    /// Serial number.
    #[arg(long)]
    pub serial: Option<u64>,

    /// Mark the certificate as a CA.
    #[arg(long)]
    pub is_ca: bool,
}

/// Arguments for `cert`.
#[derive(Args, Debug, Clone)]
pub struct CertArgs {
    /// Shared issuance flags.
    #[command(flatten)]
    pub issue: IssueArgs,

    /// Issuer certificate; signs with the issuer instead of self-signing.
    #[arg(long, requires = "ca_key")]
    pub ca_cert: Option<PathBuf>,

    /// Issuer private key.
    #[arg(long, requires = "ca_cert")]
    pub ca_key: Option<PathBuf>,
}

/// Arguments for `req`.
#[derive(Args, Debug, Clone)]
pub struct ReqArgs {
    /// Shared issuance flags.
    #[command(flatten)]
    pub issue: IssueArgs,
}

/// Client certificate presented to endpoints that require mutual TLS.
#[derive(Args, Debug, Clone)]
pub struct ClientAuthArgs {
    /// Client certificate chain (PEM); only used with `--url`.
    #[arg(long, requires = "client_key")]
    pub client_cert: Option<PathBuf>,

    /// Client private key (PEM).
    #[arg(long, requires = "client_cert")]
    pub client_key: Option<PathBuf>,
}

/// Arguments for `verify`.
#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("target").required(true).args(["cert_file", "url"])))]
pub struct VerifyArgs {
    /// CA certificates (PEM) to trust.
    #[arg(long)]
    pub ca_file: PathBuf,

    /// Certificate file to verify.
    #[arg(long)]
    pub cert_file: Option<PathBuf>,

    /// Hostname the certificate must be valid for.
    #[arg(long, conflicts_with = "url")]
    pub dns: Option<String>,

    /// Endpoint whose certificate to verify; its host is checked as well.
    #[arg(long)]
    pub url: Option<String>,

    /// Mutual TLS credentials.
    #[command(flatten)]
    pub client: ClientAuthArgs,
}

/// Arguments for `info`.
#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("target").required(true).args(["cert", "csr", "url"])))]
pub struct InfoArgs {
    /// Certificate file.
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// Certificate request file.
    #[arg(long)]
    pub csr: Option<PathBuf>,

    /// Endpoint whose leaf certificate to show.
    #[arg(long)]
    pub url: Option<String>,

    /// Write the report here instead of stdout.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Mutual TLS credentials.
    #[command(flatten)]
    pub client: ClientAuthArgs,
}
