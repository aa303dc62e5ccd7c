//! Serializable component configuration.
//!
//! Configurable pieces of a team are described by a [`ComponentModel`]: a
//! provider name that selects the implementation plus a free-form `config`
//! object interpreted by that provider.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TeamError, TeamResult};
use crate::termination::{
    MaxMessageTermination, OrTermination, OrTerminationConfig, TerminationCondition,
    TextMentionTermination,
};

/// Component type of termination conditions.
pub const TERMINATION_COMPONENT_TYPE: &str = "termination";

/// Version of the component model schema this crate reads and writes.
pub const COMPONENT_SCHEMA_VERSION: u32 = 1;

/// Description of a configurable component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentModel {
    /// Implementation to instantiate
    pub provider: String,
    /// Logical type of the component, e.g. `termination`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_type: Option<String>,
    /// Schema version of this model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Version of the component's own config layout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Provider-specific configuration
    #[serde(default)]
    pub config: serde_json::Value,
}

impl ComponentModel {
    pub fn new(provider: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            provider: provider.into(),
            component_type: None,
            version: Some(COMPONENT_SCHEMA_VERSION),
            component_version: Some(1),
            description: None,
            config,
        }
    }

    pub fn with_component_type(mut self, component_type: impl Into<String>) -> Self {
        self.component_type = Some(component_type.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn expect_type(&self, expected: &str) -> TeamResult<()> {
        match self.component_type.as_deref() {
            None => Ok(()),
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(TeamError::component(format!(
                "expected component type '{}', found '{}'",
                expected, t
            ))),
        }
    }

    fn expect_supported_version(&self) -> TeamResult<()> {
        match self.version {
            Some(v) if v > COMPONENT_SCHEMA_VERSION => Err(TeamError::component(format!(
                "unsupported component version {} (supported: {})",
                v, COMPONENT_SCHEMA_VERSION
            ))),
            _ => Ok(()),
        }
    }

    fn parse_config<T: serde::de::DeserializeOwned>(&self) -> TeamResult<T> {
        serde_json::from_value(self.config.clone()).map_err(|e| {
            TeamError::component(format!("invalid config for '{}': {}", self.provider, e))
        })
    }
}

/// Build a termination condition from its component description.
pub fn load_termination(model: &ComponentModel) -> TeamResult<Arc<dyn TerminationCondition>> {
    model.expect_type(TERMINATION_COMPONENT_TYPE)?;
    model.expect_supported_version()?;
    debug!(provider = %model.provider, "Loading termination condition");

    let condition: Arc<dyn TerminationCondition> = match model.provider.as_str() {
        MaxMessageTermination::PROVIDER => {
            Arc::new(MaxMessageTermination::from_config(model.parse_config()?)?)
        }
        TextMentionTermination::PROVIDER => {
            Arc::new(TextMentionTermination::from_config(model.parse_config()?)?)
        }
        OrTermination::PROVIDER => {
            let config: OrTerminationConfig = model.parse_config()?;
            if config.conditions.is_empty() {
                return Err(TeamError::component("'or' needs at least one condition"));
            }
            let conditions = config
                .conditions
                .iter()
                .map(load_termination)
                .collect::<TeamResult<Vec<_>>>()?;
            Arc::new(OrTermination::new(conditions))
        }
        other => {
            return Err(TeamError::component(format!(
                "unknown termination provider: {}",
                other
            )))
        }
    };
    Ok(condition)
}
