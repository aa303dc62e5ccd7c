//! Team configuration files.
//!
//! A team file lists the participants, an optional task and an optional
//! termination component:
//!
//! ```yaml
//! task: Plan the release
//! participants:
//!   - name: writer
//!     description: Drafts the notes
//!     replies: ["Draft ready", "Revised draft"]
//!   - name: reviewer
//! termination:
//!   provider: max_message
//!   config:
//!     max_messages: 5
//! ```
//!
//! Participants with `replies` speak their script; the others echo.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agents::{ChatAgent, EchoAgent, ScriptedAgent};
use crate::component::{load_termination, ComponentModel};
use crate::error::TeamResult;
use crate::team::GroupChat;
use crate::termination::TerminationCondition;

/// One participant entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Canned replies, spoken one per turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replies: Option<Vec<String>>,
}

impl ParticipantConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            replies: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_replies<I, S>(mut self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replies = Some(replies.into_iter().map(Into::into).collect());
        self
    }

    /// Build the participant this entry describes.
    pub fn build(&self) -> Arc<dyn ChatAgent> {
        match &self.replies {
            Some(replies) => {
                let mut agent = ScriptedAgent::new(&self.name, replies.iter().cloned());
                if let Some(description) = &self.description {
                    agent = agent.with_description(description);
                }
                Arc::new(agent)
            }
            None => {
                let mut agent = EchoAgent::new(&self.name);
                if let Some(description) = &self.description {
                    agent = agent.with_description(description);
                }
                Arc::new(agent)
            }
        }
    }
}

/// A team described in YAML or JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TeamConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default)]
    pub participants: Vec<ParticipantConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<ComponentModel>,
}

impl TeamConfig {
    pub fn from_yaml_str(content: &str) -> TeamResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> TeamResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Read a config file. `.json` files are parsed as JSON, anything else
    /// as YAML.
    pub fn load(path: impl AsRef<Path>) -> TeamResult<Self> {
        let path = path.as_ref();
        debug!("Reading team config from {:?}", path);

        let content = fs::read_to_string(path)?;
        if path.extension().map_or(false, |ext| ext == "json") {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    /// Write the config as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> TeamResult<()> {
        let path = path.as_ref();
        debug!("Writing team config to {:?}", path);
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Check the config without building anything.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.participants.is_empty() {
            result.add_error("At least one participant is required.");
        }
        let mut names = HashSet::new();
        for participant in &self.participants {
            if participant.name.trim().is_empty() {
                result.add_error("Participant names must not be empty.");
            } else if !names.insert(participant.name.as_str()) {
                result.add_error(format!("Duplicate participant name: {}", participant.name));
            }
            if matches!(&participant.replies, Some(replies) if replies.is_empty()) {
                result.add_warning(format!(
                    "Participant '{}' has an empty script and will never speak",
                    participant.name
                ));
            }
        }

        match &self.termination {
            Some(model) => {
                if let Err(e) = load_termination(model) {
                    result.add_error(format!("Invalid termination: {}", e));
                }
            }
            None => {
                if self.participants.iter().any(|p| p.replies.is_none()) {
                    result.add_warning(
                        "No termination condition: echoing participants will talk forever",
                    );
                }
            }
        }

        result
    }

    pub fn termination_condition(&self) -> TeamResult<Option<Arc<dyn TerminationCondition>>> {
        self.termination.as_ref().map(load_termination).transpose()
    }

    /// Build a round-robin team from this config.
    pub fn build(&self) -> TeamResult<GroupChat> {
        let participants = self.participants.iter().map(ParticipantConfig::build).collect();
        GroupChat::round_robin(participants, self.termination_condition()?)
    }
}

/// Outcome of validating a config.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const YAML: &str = r#"
name: release
task: Plan the release
participants:
  - name: writer
    description: Drafts the notes
    replies: ["Draft ready"]
  - name: reviewer
termination:
  provider: max_message
  config:
    max_messages: 3
"#;

    #[test]
    fn test_parse_yaml() {
        let config = TeamConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(config.name.as_deref(), Some("release"));
        assert_eq!(config.participants.len(), 2);
        assert_eq!(config.participants[0].replies.as_ref().unwrap().len(), 1);
        assert!(config.participants[1].replies.is_none());

        let result = config.validate();
        assert!(result.valid, "{:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_build_team() {
        let team = TeamConfig::from_yaml_str(YAML).unwrap().build().unwrap();
        assert_eq!(team.participant_names(), &["writer".to_string(), "reviewer".to_string()]);
        assert!(team.termination_condition().is_some());
    }

    #[test]
    fn test_validate_reports_problems() {
        let config = TeamConfig {
            participants: vec![
                ParticipantConfig::new("a"),
                ParticipantConfig::new("a").with_replies(Vec::<String>::new()),
                ParticipantConfig::new(" "),
            ],
            termination: Some(ComponentModel::new("unknown", serde_json::json!({}))),
            ..Default::default()
        };

        let result = config.validate();
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 3);
        assert!(result.errors.iter().any(|e| e.contains("Duplicate participant name: a")));
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_validate_warns_without_termination() {
        let config = TeamConfig {
            participants: vec![ParticipantConfig::new("echo")],
            ..Default::default()
        };
        let result = config.validate();
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_load_and_save_files() {
        let dir = TempDir::new().unwrap();
        let config = TeamConfig {
            task: Some("Hello".to_string()),
            participants: vec![ParticipantConfig::new("a").with_description("first")],
            ..Default::default()
        };

        let yaml_path = dir.path().join("team.yaml");
        config.save(&yaml_path).unwrap();
        assert_eq!(TeamConfig::load(&yaml_path).unwrap(), config);

        let json_path = dir.path().join("team.json");
        fs::write(&json_path, serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(TeamConfig::load(&json_path).unwrap(), config);

        assert!(TeamConfig::load(dir.path().join("missing.yaml")).is_err());
    }
}
