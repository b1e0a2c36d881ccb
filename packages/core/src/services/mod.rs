//! Business Services
//!
//! - `TreeService` - editing workflow over one scope: render, reconcile,
//!   editor actions, range reads and change events
//!
//! Services coordinate between the database layer and the tree semantics,
//! owning batch boundaries and the per-scope serialization of edits.

pub mod tree_service;

pub use tree_service::{ReconcileOutcome, ReorderItem, TreeService};
