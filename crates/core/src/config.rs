//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::TagError;

/// What happens when a tag name is registered twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DuplicatePolicy {
    /// The later registration silently replaces the earlier one.
    #[default]
    Overwrite,
    /// Re-registering an existing name fails with `InvalidArgument`.
    Reject,
}

/// Configuration for a [`TagEngine`](crate::TagEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Delimiter opening a tag directive.
    pub open_delimiter: String,
    /// Delimiter closing a tag directive.
    pub close_delimiter: String,
    /// Leave tags inside fenced code blocks (``` / ~~~) untouched.
    pub skip_code_fences: bool,
    /// Duplicate registration behavior.
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            open_delimiter: "{%".to_string(),
            close_delimiter: "%}".to_string(),
            skip_code_fences: false,
            duplicate_policy: DuplicatePolicy::Overwrite,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing keys take their defaults.
    pub fn from_json_str(input: &str) -> Result<Self, TagError> {
        let config: Self = serde_json::from_str(input)
            .map_err(|err| TagError::invalid_argument(format!("invalid engine config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject delimiter settings the scanner cannot work with.
    pub fn validate(&self) -> Result<(), TagError> {
        if self.open_delimiter.is_empty() || self.close_delimiter.is_empty() {
            return Err(TagError::invalid_argument("tag delimiters must not be empty"));
        }
        Ok(())
    }
}
