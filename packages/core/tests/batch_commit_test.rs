//! Batch Commit Failure Tests
//!
//! A COMMIT that fails (for example with SQLITE_BUSY) leaves the transaction
//! open. The service and the reconciler must roll it back, so the next batch
//! starts clean and nothing from the failed batch survives.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use subject_tree_core::db::{
    BatchStep, DatabaseError, LibsqlStore, NodeBounds, SubjectStore, TreeLink,
};
use subject_tree_core::models::{
    Attributes, ClientSnapshot, DeleteResult, Department, NewSubject, SnapshotEntry, Subject,
    SubjectAttributes,
};
use subject_tree_core::tree::{PlainTreeHooks, TreeScope, TreeSnapshotReconciler};
use subject_tree_core::{TreeConfig, TreeError, TreeService};
use tempfile::TempDir;

/// libsql store whose next COMMIT fails once when armed
struct BusyCommitStore {
    inner: LibsqlStore,
    fail_next_commit: AtomicBool,
}

impl BusyCommitStore {
    fn arm(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SubjectStore for BusyCommitStore {
    async fn find(&self, id: &str) -> Result<Option<Subject>, TreeError> {
        self.inner.find(id).await
    }

    async fn children_of(&self, parent_id: Option<&str>) -> Result<Vec<Subject>, TreeError> {
        self.inner.children_of(parent_id).await
    }

    async fn descendants_of(&self, id: &str) -> Result<Vec<Subject>, TreeError> {
        self.inner.descendants_of(id).await
    }

    async fn ancestors_of(&self, id: &str) -> Result<Vec<Subject>, TreeError> {
        self.inner.ancestors_of(id).await
    }

    async fn all_subjects(&self) -> Result<Vec<Subject>, TreeError> {
        self.inner.all_subjects().await
    }

    async fn max_child_sort(&self, parent_id: Option<&str>) -> Result<Option<i64>, TreeError> {
        self.inner.max_child_sort(parent_id).await
    }

    async fn forest_links(&self) -> Result<Vec<TreeLink>, TreeError> {
        self.inner.forest_links().await
    }

    async fn create(&self, subject: NewSubject) -> Result<Subject, TreeError> {
        self.inner.create(subject).await
    }

    async fn update(&self, id: &str, attributes: SubjectAttributes) -> Result<Subject, TreeError> {
        self.inner.update(id, attributes).await
    }

    async fn reparent(&self, id: &str, new_parent_id: Option<&str>) -> Result<(), TreeError> {
        self.inner.reparent(id, new_parent_id).await
    }

    async fn set_sort(&self, id: &str, sort: i64) -> Result<(), TreeError> {
        self.inner.set_sort(id, sort).await
    }

    async fn delete(&self, id: &str) -> Result<DeleteResult, TreeError> {
        self.inner.delete(id).await
    }

    async fn write_bounds(&self, bounds: &[NodeBounds]) -> Result<(), TreeError> {
        self.inner.write_bounds(bounds).await
    }

    async fn create_department(
        &self,
        name: &str,
        root_subject_id: &str,
    ) -> Result<Department, TreeError> {
        self.inner.create_department(name, root_subject_id).await
    }

    async fn find_department(&self, id: &str) -> Result<Option<Department>, TreeError> {
        self.inner.find_department(id).await
    }

    async fn protected_anchors(&self) -> Result<HashSet<String>, TreeError> {
        self.inner.protected_anchors().await
    }

    async fn begin_batch(&self) -> Result<(), TreeError> {
        self.inner.begin_batch().await
    }

    async fn commit_batch(&self) -> Result<(), TreeError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            let busy = libsql::Error::SqliteFailure(5, "database is locked".to_string());
            return Err(DatabaseError::batch(BatchStep::Commit, busy).into());
        }
        self.inner.commit_batch().await
    }

    async fn rollback_batch(&self) -> Result<(), TreeError> {
        self.inner.rollback_batch().await
    }
}

async fn create_busy_store() -> Result<(Arc<BusyCommitStore>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let inner = LibsqlStore::new(temp_dir.path().join("test.db")).await?;
    let store = Arc::new(BusyCommitStore {
        inner,
        fail_next_commit: AtomicBool::new(false),
    });
    Ok((store, temp_dir))
}

fn attrs(name: &str) -> Attributes {
    json!({ "name": name }).as_object().cloned().unwrap_or_default()
}

fn is_commit_failure(err: &TreeError) -> bool {
    matches!(
        err,
        TreeError::Database(DatabaseError::BatchFailed {
            step: BatchStep::Commit,
            ..
        })
    )
}

// ============================================================================
// Editor actions
// ============================================================================

#[tokio::test]
async fn test_failed_commit_rolls_back_add() -> Result<()> {
    let (store, _temp_dir) = create_busy_store().await?;
    let service = TreeService::new(store.clone(), TreeScope::Whole, TreeConfig::default())?;
    let mut events = service.subscribe_to_events();

    store.arm();
    let err = service.add_root(&attrs("Lost")).await.unwrap_err();
    assert!(is_commit_failure(&err));
    assert!(events.try_recv().is_err());

    // The transaction was closed, so the next batch can begin
    let kept = service.add_root(&attrs("Kept")).await?;

    let names: Vec<String> = store.all_subjects().await?.into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["Kept"]);
    assert_eq!((kept.left_bound, kept.right_bound), (1, 2));
    Ok(())
}

// ============================================================================
// Reconciliation
// ============================================================================

#[tokio::test]
async fn test_failed_commit_rolls_back_reconcile() -> Result<()> {
    let (store, _temp_dir) = create_busy_store().await?;
    let scope = TreeScope::Whole;
    let hooks = PlainTreeHooks;
    let reconciler = TreeSnapshotReconciler::new(store.as_ref(), &scope, &hooks);

    let snapshot = ClientSnapshot::new()
        .with_entry("new-1", SnapshotEntry::new(None, attrs("Algebra")))
        .with_entry("new-2", SnapshotEntry::new(None, attrs("Geometry")));

    store.arm();
    let err = reconciler.reconcile(&snapshot).await.unwrap_err();
    assert!(is_commit_failure(&err));
    assert!(store.all_subjects().await?.is_empty());

    let report = reconciler.reconcile(&snapshot).await?;
    assert_eq!(report.created.len(), 2);
    assert_eq!(store.all_subjects().await?.len(), 2);
    Ok(())
}
