//! Subject Tree Core
//!
//! A hierarchical subject store persisted with a nested-set index. Editors
//! receive the tree as a nested snapshot, edit it freely and submit it back;
//! the reconciler turns the submitted snapshot into creates, updates,
//! reparents, reorders and deletes applied as one batch, then repairs the
//! nested-set bounds so subtree and ancestor reads stay plain range scans.
//!
//! # Architecture
//!
//! - **Structure in `parent_id` + `sort`**: bounds are derived data, rewritten
//!   once per batch
//! - **Anchored scopes**: a department designates one subject as the
//!   protected top of the sub-forest its editors see
//! - **libsql**: embedded SQLite-compatible database; an in-memory store
//!   serves tests and tooling
//!
//! # Modules
//!
//! - [`models`] - Subject, Department, ClientSnapshot
//! - [`db`] - Store trait, libsql and in-memory backends, events
//! - [`tree`] - Nested-set index, reconciler, view, hooks
//! - [`services`] - `TreeService` editing workflow
//! - [`config`] - Service configuration

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod tree;

// Re-export commonly used types
pub use config::TreeConfig;
pub use models::*;
pub use services::*;
pub use tree::{TreeError, TreeScope};
