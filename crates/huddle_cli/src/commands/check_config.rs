//! Check-config command - Validate a team config file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use huddle_team::TeamConfig;

#[derive(Args)]
pub struct CheckConfigArgs {
    /// Path to the team config (YAML or JSON)
    file: PathBuf,
}

pub async fn execute(args: CheckConfigArgs) -> Result<()> {
    info!("Checking team config {:?}", args.file);

    let config = TeamConfig::load(&args.file)
        .with_context(|| format!("Failed to load team config from {:?}", args.file))?;
    let result = config.validate();

    println!("Team config: {}", args.file.display());
    if let Some(name) = &config.name {
        println!("  Name:         {}", name);
    }
    println!(
        "  Participants: {}",
        config
            .participants
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if let Some(termination) = &config.termination {
        println!("  Termination:  {}", termination.provider);
    }
    println!();

    for warning in &result.warnings {
        println!("  ⚠️  {}", warning);
    }
    for error in &result.errors {
        println!("  ❌ {}", error);
    }

    if !result.valid {
        anyhow::bail!("Team config validation failed");
    }

    println!("✅ Team config is valid");
    Ok(())
}
