//! huddle CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Validation failure
//! - 4: Run cancelled

use std::process::ExitCode;

use clap::Parser;
use huddle_team::TeamError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const CANCELLED: u8 = 4;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,huddle={level},huddle_team={level},huddle_runtime={level}"
        ))
    });

    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::CheckConfig(args) => commands::check_config::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(team_error) = e.chain().find_map(|c| c.downcast_ref::<TeamError>()) {
        return match team_error {
            TeamError::Validation(_) => ExitCodes::INVALID_ARGS,
            TeamError::Cancelled => ExitCodes::CANCELLED,
            _ => ExitCodes::GENERAL_ERROR,
        };
    }

    let msg = e.to_string().to_lowercase();
    if msg.contains("validation") {
        ExitCodes::VALIDATION_FAILURE
    } else if msg.contains("argument") || msg.contains("participant") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_team_errors() {
        let cancelled = anyhow::Error::new(TeamError::Cancelled).context("Team run failed");
        assert_eq!(categorize_error(&cancelled), ExitCodes::CANCELLED);

        let invalid = anyhow::Error::new(TeamError::Validation("bad".into()));
        assert_eq!(categorize_error(&invalid), ExitCodes::INVALID_ARGS);
    }

    #[test]
    fn test_categorize_plain_errors() {
        assert_eq!(
            categorize_error(&anyhow::anyhow!("Team config validation failed")),
            ExitCodes::VALIDATION_FAILURE
        );
        assert_eq!(
            categorize_error(&anyhow::anyhow!("boom")),
            ExitCodes::GENERAL_ERROR
        );
    }
}
