//! Data Models
//!
//! This module contains the core data structures of the subject tree:
//!
//! - `Subject` - Persisted tree node with nested-set bounds
//! - `Department` - Owning entity that anchors a sub-forest
//! - `ClientSnapshot` - Ordered, nested editor representation of a tree

mod department;
mod snapshot;
mod subject;

pub use department::Department;
pub use snapshot::{client_key_for, ClientSnapshot, SnapshotEntry};
pub use subject::{
    Attributes, DeleteResult, NewSubject, Subject, SubjectAttributes, ValidationError,
};
