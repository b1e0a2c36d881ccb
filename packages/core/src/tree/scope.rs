//! Editing scopes
//!
//! A scope decides which part of the forest an editor sees and where its
//! top-level entries hang.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TreeScope {
    /// The whole forest; top-level entries are roots (`parent_id = NULL`)
    Whole,

    /// The sub-forest below an anchor subject owned by an external entity
    ///
    /// The anchor itself never appears in snapshots; top-level entries are
    /// its children.
    #[serde(rename_all = "camelCase")]
    Anchored { anchor_id: String },
}

impl TreeScope {
    pub fn anchored(anchor_id: impl Into<String>) -> Self {
        Self::Anchored {
            anchor_id: anchor_id.into(),
        }
    }

    pub fn anchor_id(&self) -> Option<&str> {
        match self {
            TreeScope::Whole => None,
            TreeScope::Anchored { anchor_id } => Some(anchor_id),
        }
    }

    /// Parent id given to top-level snapshot entries
    pub fn top_parent(&self) -> Option<&str> {
        self.anchor_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_parent() {
        assert_eq!(TreeScope::Whole.top_parent(), None);
        assert_eq!(TreeScope::anchored("a").top_parent(), Some("a"));
    }

    #[test]
    fn test_scope_serialization_contract() {
        let value = serde_json::to_value(TreeScope::anchored("dep-root")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "anchored", "anchorId": "dep-root"})
        );
        let value = serde_json::to_value(TreeScope::Whole).unwrap();
        assert_eq!(value, serde_json::json!({"type": "whole"}));
    }
}
