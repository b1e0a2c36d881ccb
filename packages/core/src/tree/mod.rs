//! Tree Semantics
//!
//! Everything between the editor's nested snapshot and the flat subject
//! rows a [`SubjectStore`](crate::db::SubjectStore) persists:
//!
//! - [`NestedSetIndex`] - derives and repairs `left_bound` / `right_bound`
//! - [`TreeSnapshotReconciler`] - applies a submitted snapshot as one batch
//! - [`TreeView`] - renders the persisted forest back into a snapshot
//! - [`TreeHooks`] - lifecycle strategy chosen per scope
//! - [`EditSession`] - client key to record cache of one editing session

mod error;
mod hooks;
mod nested_set;
mod reconciler;
mod scope;
mod session;
mod view;

pub use error::{EntryValidationError, TreeError};
pub use hooks::{hooks_for_scope, AnchoredTreeHooks, PlainTreeHooks, TreeHooks};
pub use nested_set::{NestedSetIndex, RepairStats};
pub use reconciler::{
    flatten, CreatedEntry, DuplicateEntry, FlatEntry, PlanParent, PlanTarget, PlannedUpsert,
    ReconcileOptions, ReconcilePlan, ReconcileReport, RetainedSort, TreeSnapshotReconciler,
};
pub(crate) use reconciler::normalize_sorts;
pub use scope::TreeScope;
pub use session::EditSession;
pub use view::{RenderedTree, TreeView};
