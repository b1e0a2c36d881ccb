//! Lifecycle Hooks
//!
//! A strategy trait with one method per lifecycle point of a subject:
//!
//! - `before_create` - validate / normalize attributes of a new subject
//! - `before_save` - validate / normalize attributes of an existing subject
//! - `before_fill` - adjust the attribute map a rendered entry exposes
//! - `on_delete` - veto or observe the deletion of a subtree root
//!
//! The variant is chosen once, when a `TreeService` is built for a scope:
//! [`PlainTreeHooks`] for the whole forest, [`AnchoredTreeHooks`] when a
//! department anchor tops the editable sub-forest.
//!
//! # Examples
//!
//! ```rust
//! use subject_tree_core::tree::{PlainTreeHooks, TreeHooks};
//! use subject_tree_core::models::SubjectAttributes;
//!
//! let hooks = PlainTreeHooks;
//! let mut attributes = SubjectAttributes::new("  Algebra ");
//! hooks.before_create(&mut attributes).unwrap();
//! assert_eq!(attributes.name, "Algebra");
//! ```

use crate::models::{Attributes, Subject, SubjectAttributes, ValidationError};
use crate::tree::{TreeError, TreeScope};
use std::sync::Arc;

pub trait TreeHooks: Send + Sync {
    fn before_create(&self, attributes: &mut SubjectAttributes) -> Result<(), ValidationError>;

    fn before_save(
        &self,
        attributes: &mut SubjectAttributes,
        existing: &Subject,
    ) -> Result<(), ValidationError>;

    /// Default keeps the stored attributes as they are
    fn before_fill(&self, _subject: &Subject, _attributes: &mut Attributes) {}

    fn on_delete(&self, _subject: &Subject) -> Result<(), TreeError> {
        Ok(())
    }
}

/// Trim the label and require it to be non-empty
fn normalize_name(attributes: &mut SubjectAttributes) -> Result<(), ValidationError> {
    let trimmed = attributes.name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("name".to_string()));
    }
    if trimmed.len() != attributes.name.len() {
        attributes.name = trimmed.to_string();
    }
    Ok(())
}

/// Hooks for an unscoped forest
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTreeHooks;

impl TreeHooks for PlainTreeHooks {
    fn before_create(&self, attributes: &mut SubjectAttributes) -> Result<(), ValidationError> {
        normalize_name(attributes)
    }

    fn before_save(
        &self,
        attributes: &mut SubjectAttributes,
        _existing: &Subject,
    ) -> Result<(), ValidationError> {
        normalize_name(attributes)
    }
}

/// Hooks for a sub-forest under a department anchor
///
/// Same validation as [`PlainTreeHooks`]; additionally the anchor itself can
/// be neither saved nor deleted through this scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchoredTreeHooks {
    pub anchor_id: String,
}

impl AnchoredTreeHooks {
    pub fn new(anchor_id: impl Into<String>) -> Self {
        Self {
            anchor_id: anchor_id.into(),
        }
    }
}

impl TreeHooks for AnchoredTreeHooks {
    fn before_create(&self, attributes: &mut SubjectAttributes) -> Result<(), ValidationError> {
        normalize_name(attributes)
    }

    fn before_save(
        &self,
        attributes: &mut SubjectAttributes,
        existing: &Subject,
    ) -> Result<(), ValidationError> {
        if existing.id == self.anchor_id {
            return Err(ValidationError::ProtectedAnchor(existing.id.clone()));
        }
        normalize_name(attributes)
    }

    fn on_delete(&self, subject: &Subject) -> Result<(), TreeError> {
        if subject.id == self.anchor_id {
            return Err(TreeError::protected(subject.id.clone()));
        }
        Ok(())
    }
}

/// Pick the hooks variant matching a scope
pub fn hooks_for_scope(scope: &TreeScope) -> Arc<dyn TreeHooks> {
    match scope {
        TreeScope::Whole => Arc::new(PlainTreeHooks),
        TreeScope::Anchored { anchor_id } => Arc::new(AnchoredTreeHooks::new(anchor_id.clone())),
    }
}
