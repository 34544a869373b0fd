//! clawssl binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use claw_pki::PkiConfig;
use claw_ssl::cli::{Cli, Commands};
use claw_ssl::commands::{CertCommand, InfoCommand, KeyCommand, ReqCommand, VerifyCommand};
use claw_ssl::output::OutputFormat;
use claw_ssl::prompt::LinePrompter;

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries artifacts and reports.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), claw_ssl::CliError> {
    let config = PkiConfig::load(cli.config.as_deref())?;
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Key(args) => {
            KeyCommand::new(&config).execute(&mut stdout, &format, &args)?;
        }
        Commands::Cert(args) => {
            let mut prompter = LinePrompter::stdio();
            CertCommand::new(&config).execute(&mut stdout, &format, &mut prompter, &args)?;
        }
        Commands::Req(args) => {
            let mut prompter = LinePrompter::stdio();
            ReqCommand::new(&config).execute(&mut stdout, &format, &mut prompter, &args)?;
        }
        Commands::Verify(args) => {
            VerifyCommand::new(&config).execute(&mut stdout, &format, &args)?;
        }
        Commands::Info(args) => {
            InfoCommand::new(&config).execute(&mut stdout, &format, &args)?;
        }
    }

    Ok(())
}
