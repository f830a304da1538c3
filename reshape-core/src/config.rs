//! Shape configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings for one [`Shape`](crate::Shape).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShapeConfig {
    /// Name recorded on the shape's tracing spans.
    pub name: Option<String>,
    /// Maximum number of actions applied by one flush. `None` is unlimited.
    pub action_limit: Option<usize>,
}

impl ShapeConfig {
    /// Parse a config from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_action_limit(mut self, limit: usize) -> Self {
        self.action_limit = Some(limit);
        self
    }
}
