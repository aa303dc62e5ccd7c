//! CLI command definitions.

use clap::{Parser, Subcommand};

pub mod check_config;
pub mod run;

/// huddle - round-robin group chats between agents
#[derive(Parser)]
#[command(name = "huddle")]
#[command(version, about = "huddle - round-robin group chats between agents")]
#[command(long_about = r#"
huddle runs a team of participants that take turns on a shared task until a
termination condition fires or nobody has anything left to say.

COMMANDS:
  run           → Run a team and stream its messages
  check-config  → Validate a team config file

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Validation failure
  4 - Run cancelled
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a team and stream its messages
    Run(run::RunArgs),

    /// Validate a team config file
    #[command(name = "check-config")]
    CheckConfig(check_config::CheckConfigArgs),
}
