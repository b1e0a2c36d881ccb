//! Tree Events
//!
//! Events emitted by the tree service after a batch commits. Subscribers
//! (view caches, UI bridges) receive them through a tokio broadcast channel;
//! nothing is emitted for a batch that rolled back.

use crate::models::Subject;
use crate::tree::TreeScope;
use serde::{Deserialize, Serialize};

/// Counts of what a committed reconciliation batch changed
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub reparented: usize,
    pub reordered: usize,
    pub deleted: usize,
}

#[derive(Debug, Clone)]
pub enum TreeEvent {
    /// A subject was created by an editor action
    SubjectCreated(Subject),

    /// A subject's attributes changed through an editor action
    SubjectUpdated(Subject),

    /// A subject (and its subtree) was deleted through an editor action
    SubjectDeleted { id: String, deleted_ids: Vec<String> },

    /// Subjects were moved or reordered through an editor action
    SubjectsReordered { ids: Vec<String> },

    /// A whole snapshot was reconciled
    TreeReconciled {
        scope: TreeScope,
        summary: ReconcileSummary,
    },
}

impl TreeEvent {
    pub fn event_type(&self) -> &str {
        match self {
            TreeEvent::SubjectCreated(_) => "subject:created",
            TreeEvent::SubjectUpdated(_) => "subject:updated",
            TreeEvent::SubjectDeleted { .. } => "subject:deleted",
            TreeEvent::SubjectsReordered { .. } => "subject:reordered",
            TreeEvent::TreeReconciled { .. } => "tree:reconciled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let deleted = TreeEvent::SubjectDeleted {
            id: "a".into(),
            deleted_ids: vec!["a".into()],
        };
        assert_eq!(deleted.event_type(), "subject:deleted");

        let reconciled = TreeEvent::TreeReconciled {
            scope: TreeScope::Whole,
            summary: ReconcileSummary::default(),
        };
        assert_eq!(reconciled.event_type(), "tree:reconciled");
    }

    /// Contract test: summary serializes with camelCase keys
    #[test]
    fn test_summary_serialization_contract() {
        let summary = ReconcileSummary {
            created: 1,
            updated: 2,
            reparented: 0,
            reordered: 3,
            deleted: 4,
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "created": 1, "updated": 2, "reparented": 0, "reordered": 3, "deleted": 4
            })
        );
    }
}
