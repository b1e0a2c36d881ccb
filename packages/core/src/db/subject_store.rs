//! SubjectStore Trait - Persistence Abstraction for the Subject Tree
//!
//! The trait is the seam between tree logic (reconciler, nested-set index,
//! view) and a concrete backend. Two backends ship with the crate:
//!
//! - [`LibsqlStore`](crate::db::LibsqlStore): embedded SQLite via libsql
//! - [`MemoryStore`](crate::db::MemoryStore): in-process maps, no database
//!
//! # Batches
//!
//! A reconciliation batch brackets its mutations with `begin_batch` /
//! `commit_batch`, or `rollback_batch` on any error. Structural writes
//! (`create`, `reparent`, `set_sort`, `delete`) never touch bounds; the
//! nested-set index rewrites them once per batch via `write_bounds`, so bound
//! based reads are only meaningful outside an open batch.
//!
//! # Examples
//!
//! ```rust,no_run
//! use subject_tree_core::db::{MemoryStore, SubjectStore};
//! use subject_tree_core::models::{NewSubject, SubjectAttributes};
//!
//! # async fn example() -> Result<(), subject_tree_core::TreeError> {
//! let store = MemoryStore::new();
//! let root = store
//!     .create(NewSubject {
//!         attributes: SubjectAttributes::new("Science"),
//!         parent_id: None,
//!         sort: 0,
//!     })
//!     .await?;
//! assert!(store.children_of(Some(&root.id)).await?.is_empty());
//! # Ok(())
//! # }
//! ```

use crate::models::{DeleteResult, Department, NewSubject, Subject, SubjectAttributes};
use crate::tree::TreeError;
use async_trait::async_trait;
use std::collections::HashSet;

/// Structural view of one subject, as consumed by the nested-set index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLink {
    pub id: String,
    pub parent_id: Option<String>,
    pub sort: i64,
    pub left_bound: i64,
    pub right_bound: i64,
}

impl From<&Subject> for TreeLink {
    fn from(subject: &Subject) -> Self {
        Self {
            id: subject.id.clone(),
            parent_id: subject.parent_id.clone(),
            sort: subject.sort,
            left_bound: subject.left_bound,
            right_bound: subject.right_bound,
        }
    }
}

/// Bounds assignment produced by the nested-set index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeBounds {
    pub id: String,
    pub left_bound: i64,
    pub right_bound: i64,
}

/// Persistence operations over subjects and their anchoring departments
///
/// Implementations must be `Send + Sync`; the tree service shares one store
/// between readers and the single writer.
#[async_trait]
pub trait SubjectStore: Send + Sync {
    //
    // READS
    //

    /// Get subject by id (`Ok(None)` when absent)
    async fn find(&self, id: &str) -> Result<Option<Subject>, TreeError>;

    /// Direct children ordered by `sort` ascending; `None` lists forest roots
    async fn children_of(&self, parent_id: Option<&str>) -> Result<Vec<Subject>, TreeError>;

    /// Every descendant of `id`, in nested-set (pre-)order
    ///
    /// Pure bound range scan. Fails with `NotFound` when `id` is absent.
    async fn descendants_of(&self, id: &str) -> Result<Vec<Subject>, TreeError>;

    /// Every ancestor of `id`, forest root first (bound range scan)
    async fn ancestors_of(&self, id: &str) -> Result<Vec<Subject>, TreeError>;

    /// Every subject in the store
    async fn all_subjects(&self) -> Result<Vec<Subject>, TreeError>;

    /// Highest `sort` among the children of `parent_id`
    async fn max_child_sort(&self, parent_id: Option<&str>) -> Result<Option<i64>, TreeError>;

    /// Structural links of the whole forest (no bounds assumptions)
    async fn forest_links(&self) -> Result<Vec<TreeLink>, TreeError>;

    //
    // WRITES
    //

    /// Insert a subject under `parent_id`; the parent must exist
    async fn create(&self, subject: NewSubject) -> Result<Subject, TreeError>;

    /// Replace label and properties; `NotFound` if absent
    async fn update(&self, id: &str, attributes: SubjectAttributes) -> Result<Subject, TreeError>;

    /// Change `parent_id` only; bounds are left for the next repair
    async fn reparent(&self, id: &str, new_parent_id: Option<&str>) -> Result<(), TreeError>;

    async fn set_sort(&self, id: &str, sort: i64) -> Result<(), TreeError>;

    /// Delete a subject and its whole subtree (following `parent_id` links)
    ///
    /// Fails with `ProtectedNode` when the subtree contains a department
    /// anchor; nothing is deleted in that case.
    async fn delete(&self, id: &str) -> Result<DeleteResult, TreeError>;

    /// Persist bounds computed by the nested-set index
    async fn write_bounds(&self, bounds: &[NodeBounds]) -> Result<(), TreeError>;

    //
    // DEPARTMENTS / ANCHORS
    //

    async fn create_department(
        &self,
        name: &str,
        root_subject_id: &str,
    ) -> Result<Department, TreeError>;

    async fn find_department(&self, id: &str) -> Result<Option<Department>, TreeError>;

    /// Ids of every subject designated as a department anchor
    async fn protected_anchors(&self) -> Result<HashSet<String>, TreeError>;

    async fn is_protected(&self, id: &str) -> Result<bool, TreeError> {
        Ok(self.protected_anchors().await?.contains(id))
    }

    //
    // BATCHES
    //

    async fn begin_batch(&self) -> Result<(), TreeError>;

    async fn commit_batch(&self) -> Result<(), TreeError>;

    async fn rollback_batch(&self) -> Result<(), TreeError>;
}

/// Collect `root` and every subject below it by following `parent_id` links
///
/// Shared by backends for cascading deletes. Cycles terminate because each
/// id is visited once.
pub(crate) fn collect_subtree(links: &[TreeLink], root: &str) -> Vec<String> {
    let mut children: std::collections::HashMap<&str, Vec<&str>> = Default::default();
    for link in links {
        if let Some(parent) = link.parent_id.as_deref() {
            children.entry(parent).or_default().push(link.id.as_str());
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        ordered.push(id.to_string());
        if let Some(kids) = children.get(id) {
            stack.extend(kids.iter().rev());
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(id: &str, parent: Option<&str>) -> TreeLink {
        TreeLink {
            id: id.to_string(),
            parent_id: parent.map(str::to_string),
            sort: 0,
            left_bound: 0,
            right_bound: 0,
        }
    }

    #[test]
    fn test_collect_subtree_root_first() {
        let links = vec![
            link("r", None),
            link("a", Some("r")),
            link("a1", Some("a")),
            link("b", Some("r")),
            link("other", None),
        ];

        let subtree = collect_subtree(&links, "a");
        assert_eq!(subtree, vec!["a".to_string(), "a1".to_string()]);

        let mut whole = collect_subtree(&links, "r");
        whole.sort();
        assert_eq!(whole, vec!["a", "a1", "b", "r"]);
    }

    #[test]
    fn test_collect_subtree_terminates_on_cycle() {
        let links = vec![link("x", Some("y")), link("y", Some("x"))];
        let mut subtree = collect_subtree(&links, "x");
        subtree.sort();
        assert_eq!(subtree, vec!["x", "y"]);
    }
}
