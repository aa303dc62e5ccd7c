//! Error types for teams.

use huddle_runtime::RuntimeError;
use thiserror::Error;

/// Result type alias for team operations.
pub type TeamResult<T> = Result<T, TeamError>;

/// Errors that can occur while building, running or resetting a team.
#[derive(Error, Debug)]
pub enum TeamError {
    #[error("{0}")]
    Validation(String),

    #[error("The group chat has not been initialized. It must be run before it can be reset.")]
    NotInitialized,

    #[error("The group chat is currently running. It must be stopped before it can be reset.")]
    Running,

    #[error("The group chat is already running.")]
    AlreadyRunning,

    #[error("The run was cancelled")]
    Cancelled,

    #[error("Participant '{agent}' failed: {message}")]
    Agent { agent: String, message: String },

    #[error("Selected speaker is not a participant: {0}")]
    UnknownSpeaker(String),

    #[error("Termination condition has already been reached")]
    AlreadyTerminated,

    #[error("Invalid component: {0}")]
    Component(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TeamError {
    /// Create a participant failure error.
    pub fn agent(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Agent {
            agent: agent.into(),
            message: message.into(),
        }
    }

    /// Create a component error.
    pub fn component(message: impl Into<String>) -> Self {
        Self::Component(message.into())
    }
}
