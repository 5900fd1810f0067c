//! sessionkeep - durable conversation sessions
//!
#![doc = "Main entry point for the sessionkeep operator CLI."]

use std::process::ExitCode;

use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sessionkeep::cli::Cli;
use sessionkeep::commands;
use sessionkeep::config::Config;
use sessionkeep::error::{classify, Result};

/// Exit status for failures caused by the caller
const EXIT_CLIENT_FAULT: u8 = 2;

/// Exit status for failures of the store or the program itself
const EXIT_SERVER_FAULT: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    tracing::debug!(backend = %config.storage.backend, "Configuration loaded");
    commands::run(config, cli.command).await
}

/// Print the user-facing part of an error and pick the exit status
fn report(err: &anyhow::Error) -> ExitCode {
    tracing::debug!("Command failed: {:#}", err);

    let (message, code) = match classify(err) {
        Some(session_err) if session_err.is_client_fault() => {
            (session_err.public_message(), EXIT_CLIENT_FAULT)
        }
        Some(session_err) => {
            tracing::error!("{}", session_err);
            (session_err.public_message(), EXIT_SERVER_FAULT)
        }
        None => {
            tracing::error!("{:#}", err);
            ("Internal server error.".to_string(), EXIT_SERVER_FAULT)
        }
    };

    eprintln!("{} {}", "Error:".red().bold(), message);
    ExitCode::from(code)
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose {
        "sessionkeep=debug"
    } else {
        "sessionkeep=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
