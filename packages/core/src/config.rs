/// Configuration for a subject tree service
use crate::tree::TreeError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upper bound for `max_depth`; deeper snapshots are rejected outright
const MAX_SUPPORTED_DEPTH: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// SQLite database file; `None` keeps the tree in memory
    pub database_path: Option<PathBuf>,

    /// Attribute that carries the subject label in snapshots
    pub label_key: String,

    /// SQLite busy timeout in milliseconds
    pub busy_timeout_ms: u64,

    /// Deepest snapshot nesting the reconciler accepts
    pub max_depth: usize,

    /// Editor capabilities
    pub addable: bool,
    pub deletable: bool,
    pub reorderable: bool,

    /// Buffered events per subscriber before lagging ones drop events
    pub event_channel_capacity: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            label_key: "name".to_string(),
            busy_timeout_ms: 5000,
            max_depth: 1000,
            addable: true,
            deletable: true,
            reorderable: true,
            event_channel_capacity: 128,
        }
    }
}

impl TreeConfig {
    /// Defaults overridden by `SUBJECT_TREE_DB`, `SUBJECT_TREE_LABEL_KEY`
    /// and `SUBJECT_TREE_MAX_DEPTH`
    pub fn from_env() -> Result<Self, TreeError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("SUBJECT_TREE_DB") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(label_key) = std::env::var("SUBJECT_TREE_LABEL_KEY") {
            config.label_key = label_key;
        }
        if let Ok(depth) = std::env::var("SUBJECT_TREE_MAX_DEPTH") {
            config.max_depth = depth.parse().map_err(|_| {
                TreeError::InvalidConfig(format!(
                    "SUBJECT_TREE_MAX_DEPTH must be a positive integer, got '{}'",
                    depth
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TreeError> {
        if self.label_key.trim().is_empty() {
            return Err(TreeError::InvalidConfig(
                "label_key cannot be empty".to_string(),
            ));
        }

        if self.max_depth == 0 {
            return Err(TreeError::InvalidConfig(
                "max_depth must be greater than 0".to_string(),
            ));
        }

        if self.max_depth > MAX_SUPPORTED_DEPTH {
            return Err(TreeError::InvalidConfig(format!(
                "max_depth cannot exceed {}",
                MAX_SUPPORTED_DEPTH
            )));
        }

        if self.event_channel_capacity == 0 {
            return Err(TreeError::InvalidConfig(
                "event_channel_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TreeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.label_key, "name");
        assert!(config.addable && config.deletable && config.reorderable);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = TreeConfig {
            max_depth: 0,
            ..TreeConfig::default()
        };
        assert!(matches!(config.validate(), Err(TreeError::InvalidConfig(_))));

        let config = TreeConfig {
            label_key: " ".to_string(),
            ..TreeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TreeConfig =
            serde_json::from_str(r#"{"label_key": "title", "deletable": false}"#).unwrap();

        assert_eq!(config.label_key, "title");
        assert!(!config.deletable);
        assert!(config.addable);
        assert_eq!(config.max_depth, 1000);
    }
}
