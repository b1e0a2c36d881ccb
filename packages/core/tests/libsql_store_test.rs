//! libsql Store Persistence Tests
//!
//! Trees written through the service survive closing and reopening the
//! database file, bounds included.

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use subject_tree_core::db::{LibsqlStore, SubjectStore};
use subject_tree_core::models::Attributes;
use subject_tree_core::tree::NestedSetIndex;
use subject_tree_core::{TreeConfig, TreeScope, TreeService};
use tempfile::TempDir;

fn attrs(value: serde_json::Value) -> Attributes {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_tree_survives_reopen() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("nested").join("subjects.db");

    let (root_id, child_id, department_id) = {
        let store = Arc::new(LibsqlStore::new(db_path.clone()).await?);
        let service = TreeService::new(store.clone(), TreeScope::Whole, TreeConfig::default())?;
        let root = service
            .add_root(&attrs(json!({"name": "Music", "level": 2})))
            .await?;
        let child = service.add_child(&root.id, &attrs(json!({"name": "Theory"}))).await?;
        let department = store.create_department("Music Dept", &root.id).await?;
        (root.id, child.id, department.id)
    };
    assert!(db_path.exists());

    let store = LibsqlStore::new(db_path).await?;
    let root = store.find(&root_id).await?.expect("root persisted");
    assert_eq!(root.name, "Music");
    assert_eq!(root.properties.get("level"), Some(&json!(2)));
    assert_eq!((root.left_bound, root.right_bound), (1, 4));

    let descendants: Vec<String> = store
        .descendants_of(&root_id)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(descendants, vec![child_id.clone()]);

    let ancestors: Vec<String> = store
        .ancestors_of(&child_id)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ancestors, vec![root_id.clone()]);

    let department = store
        .find_department(&department_id)
        .await?
        .expect("department persisted");
    assert_eq!(department.root_subject_id, root_id);
    assert!(store.is_protected(&root_id).await?);

    assert!(NestedSetIndex::is_consistent(&store.forest_links().await?));
    Ok(())
}

#[tokio::test]
async fn test_rolled_back_reconcile_is_not_persisted() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("subjects.db");

    {
        let store = Arc::new(LibsqlStore::new(db_path.clone()).await?);
        let service = TreeService::new(store, TreeScope::Whole, TreeConfig::default())?;
        service.add_root(&attrs(json!({"name": "Only"}))).await?;

        // Delete is disabled, so omitting "Only" fails the whole batch
        let locked = TreeService::new(
            service.store().clone(),
            TreeScope::Whole,
            TreeConfig {
                deletable: false,
                ..TreeConfig::default()
            },
        )?;
        let snapshot = serde_json::from_value(json!({
            "new-1": {"attributes": {"name": "Replacement"}}
        }))?;
        assert!(locked.reconcile(&snapshot).await.is_err());
    }

    let store = LibsqlStore::new(db_path).await?;
    let names: Vec<String> = store
        .all_subjects()
        .await?
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["Only"]);
    Ok(())
}

#[tokio::test]
async fn test_repair_fixes_stale_bounds() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = Arc::new(LibsqlStore::new(temp_dir.path().join("subjects.db")).await?);
    let service = TreeService::new(store.clone(), TreeScope::Whole, TreeConfig::default())?;

    let a = service.add_root(&attrs(json!({"name": "A"}))).await?;
    let b = service.add_root(&attrs(json!({"name": "B"}))).await?;

    // Structural write outside the service leaves bounds stale
    store.reparent(&b.id, Some(&a.id)).await?;
    assert!(!NestedSetIndex::is_consistent(&store.forest_links().await?));

    let stats = service.repair(None).await?;
    assert!(stats.full_forest);
    assert!(stats.rewritten > 0);

    let a = store.find(&a.id).await?.expect("a");
    assert_eq!((a.left_bound, a.right_bound), (1, 4));
    assert!(NestedSetIndex::is_consistent(&store.forest_links().await?));
    Ok(())
}
