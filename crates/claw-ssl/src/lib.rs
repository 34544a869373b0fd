//! # claw-ssl
//!
//! The `clawssl` command-line tool.
//!
//! Provides commands for:
//! - RSA key generation
//! - Self-signed, CA-signed and CA certificates
//! - Certificate signing requests
//! - Chain verification against a CA file, for files and live endpoints
//! - Certificate and request inspection
//!
//! # Architecture
//!
//! Commands are thin: they read files, prompt for a subject, and hand off
//! to `claw-pki` for templates, signing, handshakes and verification.
//!
//! ```text
//! ┌───────────┐   prompts / files    ┌─────────────────┐    TLS    ┌──────────┐
//! │  clawssl  │─────────────────────►│    claw-pki     │──────────►│ endpoint │
//! └───────────┘                      └─────────────────┘           └──────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;
pub mod prompt;

pub use cli::{Cli, Commands, Format};
pub use error::CliError;
pub use output::OutputFormat;
pub use prompt::{LinePrompter, Prompter};
