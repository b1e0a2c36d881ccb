//! Tree Error Types
//!
//! Every error aborts the reconciliation batch it occurs in; the batch is
//! rolled back before the error reaches the caller. Errors carry the
//! offending subject id and, when the error came from a submitted snapshot,
//! the client key of the entry so editors can point at it.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use std::fmt;
use thiserror::Error;

/// Validation failure of a single snapshot entry
#[derive(Debug, Clone, PartialEq)]
pub struct EntryValidationError {
    pub client_key: Option<String>,
    pub id: Option<String>,
    pub error: ValidationError,
}

impl fmt::Display for EntryValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.client_key, &self.id) {
            (Some(key), _) => write!(f, "[{}] {}", key, self.error),
            (None, Some(id)) => write!(f, "[subject {}] {}", id, self.error),
            (None, None) => write!(f, "{}", self.error),
        }
    }
}

#[derive(Error, Debug)]
pub enum TreeError {
    /// Referenced subject (or parent) does not exist
    #[error("Subject not found: {id}{}", key_suffix(.client_key))]
    NotFound {
        id: String,
        client_key: Option<String>,
    },

    /// `parent_id` links form a cycle; never repaired silently
    #[error("Cycle detected in parent links: {}", .ids.join(" -> "))]
    CycleDetected { ids: Vec<String> },

    /// Attempt to delete or move away a protected anchor subject
    #[error("Subject {id} is a protected anchor{}", key_suffix(.client_key))]
    ProtectedNode {
        id: String,
        client_key: Option<String>,
    },

    /// One or more entries failed validation
    #[error("Validation failed: {}", format_entries(.errors))]
    ValidationFailed { errors: Vec<EntryValidationError> },

    /// Editor action disabled by configuration
    #[error("Action '{0}' is disabled for this tree")]
    ActionDisabled(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn key_suffix(client_key: &Option<String>) -> String {
    client_key
        .as_ref()
        .map(|key| format!(" (client key {})", key))
        .unwrap_or_default()
}

fn format_entries(errors: &[EntryValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl TreeError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            id: id.into(),
            client_key: None,
        }
    }

    pub fn not_found_for_entry(id: impl Into<String>, client_key: impl Into<String>) -> Self {
        Self::NotFound {
            id: id.into(),
            client_key: Some(client_key.into()),
        }
    }

    pub fn protected(id: impl Into<String>) -> Self {
        Self::ProtectedNode {
            id: id.into(),
            client_key: None,
        }
    }

    pub fn protected_entry(id: impl Into<String>, client_key: impl Into<String>) -> Self {
        Self::ProtectedNode {
            id: id.into(),
            client_key: Some(client_key.into()),
        }
    }

    pub fn cycle(ids: Vec<String>) -> Self {
        Self::CycleDetected { ids }
    }

    /// Single-error validation failure not tied to a snapshot entry
    pub fn validation(id: Option<String>, error: ValidationError) -> Self {
        Self::ValidationFailed {
            errors: vec![EntryValidationError {
                client_key: None,
                id,
                error,
            }],
        }
    }

    pub fn action_disabled(action: impl Into<String>) -> Self {
        Self::ActionDisabled(action.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Attach a client key to errors that identify a single subject
    pub fn with_client_key(self, key: &str) -> Self {
        match self {
            Self::NotFound {
                id,
                client_key: None,
            } => Self::not_found_for_entry(id, key),
            Self::ProtectedNode {
                id,
                client_key: None,
            } => Self::protected_entry(id, key),
            other => other,
        }
    }
}

impl From<serde_json::Error> for TreeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_identify_client_key() {
        let err = TreeError::not_found_for_entry("abc", "record-1");
        assert_eq!(err.to_string(), "Subject not found: abc (client key record-1)");

        let err = TreeError::protected("anchor");
        assert_eq!(err.to_string(), "Subject anchor is a protected anchor");
    }

    #[test]
    fn test_with_client_key_only_fills_missing_key() {
        let err = TreeError::not_found("x").with_client_key("k1");
        assert!(matches!(
            err,
            TreeError::NotFound { ref client_key, .. } if client_key.as_deref() == Some("k1")
        ));

        let err = TreeError::not_found_for_entry("x", "k0").with_client_key("k1");
        assert!(matches!(
            err,
            TreeError::NotFound { ref client_key, .. } if client_key.as_deref() == Some("k0")
        ));
    }

    #[test]
    fn test_validation_failed_lists_every_entry() {
        let err = TreeError::ValidationFailed {
            errors: vec![
                EntryValidationError {
                    client_key: Some("a".into()),
                    id: None,
                    error: ValidationError::EmptyField("name".into()),
                },
                EntryValidationError {
                    client_key: None,
                    id: Some("s1".into()),
                    error: ValidationError::MissingField("name".into()),
                },
            ],
        };

        let message = err.to_string();
        assert!(message.contains("[a] Field must not be empty: name"));
        assert!(message.contains("[subject s1] Missing required field: name"));
    }

    #[test]
    fn test_cycle_message() {
        let err = TreeError::cycle(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Cycle detected in parent links: a -> b");
    }
}
