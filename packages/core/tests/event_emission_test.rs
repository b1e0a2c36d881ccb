//! Event Emission Tests
//!
//! Every committed batch of the tree service emits exactly one event, after
//! the commit. Rolled back batches emit nothing.

#[cfg(test)]
mod event_emission_tests {
    use anyhow::Result;
    use serde_json::json;
    use std::sync::Arc;
    use subject_tree_core::db::events::ReconcileSummary;
    use subject_tree_core::db::{LibsqlStore, TreeEvent};
    use subject_tree_core::models::{client_key_for, Attributes, ClientSnapshot, SnapshotEntry};
    use subject_tree_core::{ReorderItem, TreeConfig, TreeScope, TreeService};
    use tempfile::TempDir;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::{timeout, Duration};

    /// Helper to create a service over a test database
    async fn create_test_service() -> Result<(TreeService, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("test.db");
        let store = Arc::new(LibsqlStore::new(db_path).await?);
        let service = TreeService::new(store, TreeScope::Whole, TreeConfig::default())?;
        Ok((service, temp_dir))
    }

    fn attrs(name: &str) -> Attributes {
        json!({ "name": name }).as_object().cloned().unwrap_or_default()
    }

    async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<TreeEvent>) -> TreeEvent {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("Event should be emitted within 1 second")
            .expect("Should receive event")
    }

    #[tokio::test]
    async fn test_add_emits_subject_created() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let mut rx = service.subscribe_to_events();

        let subject = service.add_root(&attrs("Geography")).await?;

        match next_event(&mut rx).await {
            TreeEvent::SubjectCreated(created) => {
                assert_eq!(created.id, subject.id);
                assert_eq!(created.name, "Geography");
                assert_eq!((created.left_bound, created.right_bound), (1, 2));
            }
            other => panic!("Expected SubjectCreated event, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_edit_emits_subject_updated() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let subject = service.add_root(&attrs("Geografy")).await?;

        // Subscribe after creation to skip SubjectCreated
        let mut rx = service.subscribe_to_events();
        service.edit(&subject.id, &attrs("Geography")).await?;

        match next_event(&mut rx).await {
            TreeEvent::SubjectUpdated(updated) => {
                assert_eq!(updated.id, subject.id);
                assert_eq!(updated.name, "Geography");
            }
            other => panic!("Expected SubjectUpdated event, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_emits_all_deleted_ids() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let parent = service.add_root(&attrs("History")).await?;
        let child = service.add_child(&parent.id, &attrs("Ancient")).await?;

        let mut rx = service.subscribe_to_events();
        service.delete(&parent.id).await?;

        match next_event(&mut rx).await {
            TreeEvent::SubjectDeleted { id, mut deleted_ids } => {
                assert_eq!(id, parent.id);
                deleted_ids.sort();
                let mut expected = vec![parent.id.clone(), child.id.clone()];
                expected.sort();
                assert_eq!(deleted_ids, expected);
            }
            other => panic!("Expected SubjectDeleted event, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_reorder_emits_changed_ids() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let first = service.add_root(&attrs("First")).await?;
        let second = service.add_root(&attrs("Second")).await?;

        let mut rx = service.subscribe_to_events();
        service
            .reorder(&[
                ReorderItem {
                    id: second.id.clone(),
                    parent_id: None,
                    sort: 0,
                },
                ReorderItem {
                    id: first.id.clone(),
                    parent_id: None,
                    sort: 1,
                },
            ])
            .await?;

        match next_event(&mut rx).await {
            TreeEvent::SubjectsReordered { mut ids } => {
                ids.sort();
                let mut expected = vec![first.id.clone(), second.id.clone()];
                expected.sort();
                assert_eq!(ids, expected);
            }
            other => panic!("Expected SubjectsReordered event, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_reconcile_emits_one_summary_event() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let keep = service.add_root(&attrs("Keep")).await?;
        service.add_root(&attrs("Drop")).await?;

        let mut rx = service.subscribe_to_events();
        let snapshot = ClientSnapshot::new()
            .with_entry(
                client_key_for(&keep.id),
                SnapshotEntry::new(Some(keep.id.clone()), attrs("Kept")),
            )
            .with_entry("new-1", SnapshotEntry::new(None, attrs("Fresh")));
        service.reconcile(&snapshot).await?;

        match next_event(&mut rx).await {
            TreeEvent::TreeReconciled { scope, summary } => {
                assert_eq!(scope, TreeScope::Whole);
                assert_eq!(
                    summary,
                    ReconcileSummary {
                        created: 1,
                        updated: 1,
                        reparented: 0,
                        reordered: 0,
                        deleted: 1,
                    }
                );
            }
            other => panic!("Expected TreeReconciled event, got {:?}", other),
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        Ok(())
    }

    #[tokio::test]
    async fn test_rolled_back_batch_emits_nothing() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let mut rx = service.subscribe_to_events();

        let snapshot = ClientSnapshot::new().with_entry(
            "ghost",
            SnapshotEntry::new(Some("missing-id".to_string()), attrs("Ghost")),
        );
        assert!(service.reconcile(&snapshot).await.is_err());
        assert!(service.edit("missing-id", &attrs("Ghost")).await.is_err());

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        Ok(())
    }

    #[tokio::test]
    async fn test_created_key_resolves_on_resubmission() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;

        let snapshot =
            ClientSnapshot::new().with_entry("new-1", SnapshotEntry::new(None, attrs("Once")));
        let first = service.reconcile(&snapshot).await?;
        assert_eq!(first.report.created.len(), 1);

        // The editor submits again before picking up the rendered keys
        let second = service.reconcile(&snapshot).await?;
        assert!(second.report.created.is_empty());
        assert_eq!(service.children_of(None).await?.len(), 1);
        Ok(())
    }
}
