//! Database Layer
//!
//! Persistence for the subject tree:
//!
//! - [`SubjectStore`] - async trait every backend implements
//! - [`LibsqlStore`] - embedded SQLite (libsql) backend with nested-set indexes
//! - [`MemoryStore`] - in-process backend with snapshot rollback
//! - [`TreeEvent`] - change notifications emitted after committed batches
//!
//! Backends own subject identity and bounds storage; tree semantics
//! (reconciliation, bound repair, anchor scoping) live in [`crate::tree`].

mod error;
pub mod events;
mod libsql_store;
mod memory_store;
mod subject_store;

pub use error::{BatchStep, DatabaseError};
pub use events::TreeEvent;
pub use libsql_store::LibsqlStore;
pub use memory_store::MemoryStore;
pub(crate) use subject_store::collect_subtree;
pub use subject_store::{NodeBounds, SubjectStore, TreeLink};
