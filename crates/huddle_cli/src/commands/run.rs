//! Run command - Run a team and stream its messages.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use futures::StreamExt;
use tracing::{info, warn};

use huddle_team::{
    CancellationToken, ComponentModel, MaxMessageTermination, OrTermination, ParticipantConfig,
    TaskEvent, TaskResult, TeamConfig, TerminationCondition, TextMentionTermination,
};

/// Message limit applied when echoing participants have nothing else to stop them.
pub const DEFAULT_MAX_MESSAGES: usize = 10;

#[derive(Args, Default)]
pub struct RunArgs {
    /// Participant as NAME or NAME:DESCRIPTION (repeatable)
    #[arg(short, long = "participant", value_name = "NAME[:DESCRIPTION]")]
    participants: Vec<String>,

    /// Task handed to the team
    #[arg(short, long)]
    task: Option<String>,

    /// Stop once this many messages were produced
    #[arg(long, value_name = "N")]
    max_messages: Option<usize>,

    /// Stop once a message mentions this text
    #[arg(long, value_name = "TEXT")]
    stop_text: Option<String>,

    /// Team config file (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print every event as a JSON line
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args)?;

    let validation = config.validate();
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    if !validation.valid {
        for error in &validation.errors {
            eprintln!("  ❌ {}", error);
        }
        anyhow::bail!("Team validation failed");
    }

    let team = config.build().context("Failed to build team")?;
    info!(
        team_id = %team.team_id(),
        participants = ?team.participant_names(),
        "Starting team run"
    );

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            ctrl_c.cancel();
        }
    });

    let mut stream = team.run_stream(config.task.clone(), Some(token));
    while let Some(event) = stream.next().await {
        let event = event.context("Team run failed")?;
        if args.json {
            println!("{}", serde_json::to_string(&event)?);
            continue;
        }
        match event {
            TaskEvent::Message(message) => println!("{}", message),
            TaskEvent::Result(result) => print_summary(&result),
        }
    }

    Ok(())
}

fn print_summary(result: &TaskResult) {
    let elapsed = result.completed_at - result.started_at;
    println!();
    println!(
        "✅ {} messages in {} ms",
        result.messages.len(),
        elapsed.num_milliseconds()
    );
    match &result.stop_reason {
        Some(reason) => println!("   Stopped: {}", reason),
        None => println!("   Stopped: no participant had anything left to say"),
    }
}

/// Merge the config file (if any) with the command-line flags. Flags win.
fn resolve_config(args: &RunArgs) -> Result<TeamConfig> {
    let mut config = match &args.config {
        Some(path) => TeamConfig::load(path)
            .with_context(|| format!("Failed to load team config from {:?}", path))?,
        None => TeamConfig::default(),
    };

    config
        .participants
        .extend(args.participants.iter().map(|spec| parse_participant(spec)));
    if config.participants.is_empty() {
        anyhow::bail!("At least one --participant or a --config file is required");
    }

    if args.task.is_some() {
        config.task = args.task.clone();
    }

    if let Some(termination) = termination_from_flags(args.max_messages, args.stop_text.as_deref())? {
        config.termination = Some(termination);
    } else if config.termination.is_none() && config.participants.iter().any(|p| p.replies.is_none()) {
        info!(
            max_messages = DEFAULT_MAX_MESSAGES,
            "No termination given, limiting the run"
        );
        config.termination = Some(MaxMessageTermination::new(DEFAULT_MAX_MESSAGES).dump_component()?);
    }

    Ok(config)
}

fn parse_participant(spec: &str) -> ParticipantConfig {
    match spec.split_once(':') {
        Some((name, description)) => {
            ParticipantConfig::new(name.trim()).with_description(description.trim())
        }
        None => ParticipantConfig::new(spec.trim()),
    }
}

fn termination_from_flags(
    max_messages: Option<usize>,
    stop_text: Option<&str>,
) -> Result<Option<ComponentModel>> {
    let mut conditions: Vec<Arc<dyn TerminationCondition>> = Vec::new();
    if let Some(max_messages) = max_messages {
        conditions.push(Arc::new(MaxMessageTermination::new(max_messages)));
    }
    if let Some(text) = stop_text {
        conditions.push(Arc::new(TextMentionTermination::new(text)));
    }

    let condition: Arc<dyn TerminationCondition> = match conditions.len() {
        0 => return Ok(None),
        1 => conditions.remove(0),
        _ => Arc::new(OrTermination::new(conditions)),
    };
    Ok(Some(condition.dump_component()?))
}
