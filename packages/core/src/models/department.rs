//! Department model
//!
//! A department owns a slice of the subject forest by designating one existing
//! subject as its root. That subject becomes a protected anchor: the tree
//! store will not delete it, and editing a department's subjects happens in a
//! scope where the anchor is the implicit top-level parent.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: String,

    pub name: String,

    /// Anchor subject for this department's sub-forest
    pub root_subject_id: String,
}

impl Department {
    pub fn new(name: impl Into<String>, root_subject_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            root_subject_id: root_subject_id.into(),
        }
    }
}
