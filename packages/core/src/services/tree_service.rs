//! Tree Service - Editing Workflow over One Scope
//!
//! Ties the store, the tree semantics and the editor together:
//!
//! - `render` - snapshot for the editor; prunes session keys outside it
//! - `reconcile` - apply a submitted snapshot, return the fresh snapshot
//! - editor actions (`add_root`, `add_child`, `edit`, `delete`, `reorder`),
//!   each its own batch followed by a bound repair
//! - range reads (`descendants_of`, `ancestors_of`, `children_of`)
//!
//! # Concurrency
//!
//! Every mutating call takes the write side of a batch gate, every read the
//! read side, so reads never observe a batch in flight and batches on one
//! service run one at a time. Services over disjoint stores are independent.
//!
//! # Events
//!
//! A [`TreeEvent`] is broadcast after each committed batch; rolled back
//! batches emit nothing.

use crate::config::TreeConfig;
use crate::db::events::TreeEvent;
use crate::db::SubjectStore;
use crate::models::{
    Attributes, ClientSnapshot, DeleteResult, NewSubject, Subject, SubjectAttributes,
};
use crate::tree::{
    hooks_for_scope, normalize_sorts, EditSession, NestedSetIndex, ReconcileOptions,
    ReconcileReport, RepairStats, TreeError, TreeHooks, TreeScope, TreeSnapshotReconciler,
    TreeView,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

/// One row of a flat reorder request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderItem {
    pub id: String,

    /// New parent; `None` means the top of the scope
    #[serde(default)]
    pub parent_id: Option<String>,

    pub sort: i64,
}

/// Result of a reconciliation: what changed plus the refreshed snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileOutcome {
    pub report: ReconcileReport,
    pub snapshot: ClientSnapshot,
}

/// Subject tree operations over one scope
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use subject_tree_core::config::TreeConfig;
/// use subject_tree_core::db::MemoryStore;
/// use subject_tree_core::services::TreeService;
/// use subject_tree_core::tree::TreeScope;
///
/// # async fn example() -> Result<(), subject_tree_core::TreeError> {
/// let service = TreeService::new(
///     Arc::new(MemoryStore::new()),
///     TreeScope::Whole,
///     TreeConfig::default(),
/// )?;
///
/// let snapshot = service.render().await?;
/// let outcome = service.reconcile(&snapshot).await?;
/// assert!(outcome.report.is_noop());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TreeService {
    store: Arc<dyn SubjectStore>,
    scope: TreeScope,
    hooks: Arc<dyn TreeHooks>,
    config: TreeConfig,
    session: Arc<Mutex<EditSession>>,

    /// Write side for batches, read side for reads
    gate: Arc<RwLock<()>>,

    event_tx: broadcast::Sender<TreeEvent>,
}

impl TreeService {
    /// Create a service with the hooks variant matching `scope`
    pub fn new(
        store: Arc<dyn SubjectStore>,
        scope: TreeScope,
        config: TreeConfig,
    ) -> Result<Self, TreeError> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        let hooks = hooks_for_scope(&scope);

        Ok(Self {
            store,
            scope,
            hooks,
            config,
            session: Arc::new(Mutex::new(EditSession::new())),
            gate: Arc::new(RwLock::new(())),
            event_tx,
        })
    }

    /// Create a service scoped to a department's anchor subject
    pub async fn for_department(
        store: Arc<dyn SubjectStore>,
        department_id: &str,
        config: TreeConfig,
    ) -> Result<Self, TreeError> {
        let department = store
            .find_department(department_id)
            .await?
            .ok_or_else(|| TreeError::not_found(department_id))?;
        Self::new(store, TreeScope::anchored(department.root_subject_id), config)
    }

    /// Replace the scope's default hooks
    pub fn with_hooks(mut self, hooks: Arc<dyn TreeHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn store(&self) -> &Arc<dyn SubjectStore> {
        &self.store
    }

    pub fn scope(&self) -> &TreeScope {
        &self.scope
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn subscribe_to_events(&self) -> broadcast::Receiver<TreeEvent> {
        self.event_tx.subscribe()
    }

    // Nobody listening is fine
    fn emit_event(&self, event: TreeEvent) {
        let _ = self.event_tx.send(event);
    }

    //
    // RENDER / RECONCILE
    //

    /// Render the scope for the editor
    pub async fn render(&self) -> Result<ClientSnapshot, TreeError> {
        let _read = self.gate.read().await;
        let mut session = self.session.lock().await;
        self.render_into(&mut session).await
    }

    /// Apply a submitted snapshot as one batch and re-render
    #[tracing::instrument(skip(self, snapshot), fields(scope = ?self.scope))]
    pub async fn reconcile(
        &self,
        snapshot: &ClientSnapshot,
    ) -> Result<ReconcileOutcome, TreeError> {
        let _write = self.gate.write().await;
        let mut session = self.session.lock().await;

        let reconciler =
            TreeSnapshotReconciler::new(self.store.as_ref(), &self.scope, self.hooks.as_ref());
        let report = reconciler
            .with_session(&session)
            .with_options(ReconcileOptions::from(&self.config))
            .reconcile(snapshot)
            .await?;

        session.forget_ids(&report.deleted);
        for created in &report.created {
            if let Some(subject) = self.store.find(&created.id).await? {
                session.cache_record(created.client_key.clone(), subject);
            }
        }

        self.emit_event(TreeEvent::TreeReconciled {
            scope: self.scope.clone(),
            summary: report.summary(),
        });

        let snapshot = self.render_into(&mut session).await?;
        Ok(ReconcileOutcome { report, snapshot })
    }

    /// Remember which subject an editor-assigned key stands for
    pub async fn remember_key(&self, client_key: impl Into<String>, subject: Subject) {
        self.session.lock().await.cache_record(client_key, subject);
    }

    async fn render_into(&self, session: &mut EditSession) -> Result<ClientSnapshot, TreeError> {
        let rendered = TreeView::new(self.store.as_ref(), &self.scope, self.hooks.as_ref())
            .with_label_key(self.config.label_key.clone())
            .render_with_records()
            .await?;

        // Keys of subjects that left the scope or the store are dropped
        let visible: HashSet<String> = rendered.records.into_iter().map(|r| r.id).collect();
        session.retain_ids(&visible);
        Ok(rendered.snapshot)
    }

    //
    // RANGE READS
    //

    pub async fn find(&self, id: &str) -> Result<Option<Subject>, TreeError> {
        let _read = self.gate.read().await;
        self.store.find(id).await
    }

    pub async fn descendants_of(&self, id: &str) -> Result<Vec<Subject>, TreeError> {
        let _read = self.gate.read().await;
        self.store.descendants_of(id).await
    }

    pub async fn ancestors_of(&self, id: &str) -> Result<Vec<Subject>, TreeError> {
        let _read = self.gate.read().await;
        self.store.ancestors_of(id).await
    }

    /// Children of `parent_id`; `None` lists the top of the scope
    pub async fn children_of(&self, parent_id: Option<&str>) -> Result<Vec<Subject>, TreeError> {
        let _read = self.gate.read().await;
        self.store
            .children_of(parent_id.or(self.scope.top_parent()))
            .await
    }

    /// Recompute bounds for the forest (`None`) or one subtree
    pub async fn repair(&self, scope: Option<&str>) -> Result<RepairStats, TreeError> {
        let _write = self.gate.write().await;
        self.store.begin_batch().await?;
        let result = NestedSetIndex::repair(self.store.as_ref(), scope).await;
        self.finish_batch(result).await
    }

    //
    // EDITOR ACTIONS
    //

    /// Append a subject at the top of the scope
    pub async fn add_root(&self, attributes: &Attributes) -> Result<Subject, TreeError> {
        self.add_under(None, attributes).await
    }

    /// Append a subject as the last child of `parent_id`
    pub async fn add_child(
        &self,
        parent_id: &str,
        attributes: &Attributes,
    ) -> Result<Subject, TreeError> {
        self.add_under(Some(parent_id), attributes).await
    }

    #[tracing::instrument(skip(self, attributes))]
    async fn add_under(
        &self,
        parent_id: Option<&str>,
        attributes: &Attributes,
    ) -> Result<Subject, TreeError> {
        if !self.config.addable {
            return Err(TreeError::action_disabled("add"));
        }

        let mut attributes = SubjectAttributes::from_map(attributes, &self.config.label_key)
            .map_err(|e| TreeError::validation(None, e))?;
        self.hooks
            .before_create(&mut attributes)
            .map_err(|e| TreeError::validation(None, e))?;

        let _write = self.gate.write().await;
        let parent_id = parent_id.or(self.scope.top_parent());

        self.store.begin_batch().await?;
        let result = self.add_in_batch(parent_id, attributes).await;
        let subject = self.finish_batch(result).await?;

        tracing::info!("Added subject {} under {:?}", subject.id, subject.parent_id);
        self.emit_event(TreeEvent::SubjectCreated(subject.clone()));
        Ok(subject)
    }

    async fn add_in_batch(
        &self,
        parent_id: Option<&str>,
        attributes: SubjectAttributes,
    ) -> Result<Subject, TreeError> {
        if let Some(parent_id) = parent_id {
            self.ensure_in_scope(parent_id, true).await?;
        }

        let sort = self
            .store
            .max_child_sort(parent_id)
            .await?
            .map_or(0, |max| max + 1);
        let created = self
            .store
            .create(NewSubject {
                attributes,
                parent_id: parent_id.map(str::to_string),
                sort,
            })
            .await?;

        NestedSetIndex::repair(self.store.as_ref(), None).await?;
        self.store
            .find(&created.id)
            .await?
            .ok_or_else(|| TreeError::not_found(created.id))
    }

    /// Replace a subject's label and properties
    #[tracing::instrument(skip(self, attributes))]
    pub async fn edit(&self, id: &str, attributes: &Attributes) -> Result<Subject, TreeError> {
        let mut attributes = SubjectAttributes::from_map(attributes, &self.config.label_key)
            .map_err(|e| TreeError::validation(Some(id.to_string()), e))?;

        let _write = self.gate.write().await;
        self.store.begin_batch().await?;
        let result = self.edit_in_batch(id, &mut attributes).await;
        let subject = self.finish_batch(result).await?;

        self.emit_event(TreeEvent::SubjectUpdated(subject.clone()));
        Ok(subject)
    }

    async fn edit_in_batch(
        &self,
        id: &str,
        attributes: &mut SubjectAttributes,
    ) -> Result<Subject, TreeError> {
        let existing = self.ensure_in_scope(id, false).await?;
        self.hooks
            .before_save(attributes, &existing)
            .map_err(|e| TreeError::validation(Some(id.to_string()), e))?;

        if *attributes == existing.attributes() {
            return Ok(existing);
        }
        self.store.update(id, attributes.clone()).await
    }

    /// Delete a subject and its subtree
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<DeleteResult, TreeError> {
        if !self.config.deletable {
            return Err(TreeError::action_disabled("delete"));
        }

        let _write = self.gate.write().await;
        self.store.begin_batch().await?;
        let result = self.delete_in_batch(id).await;
        let deleted = self.finish_batch(result).await?;

        tracing::info!("Deleted {} subjects below and including {}", deleted.deleted_count(), id);
        self.session.lock().await.forget_ids(&deleted.deleted_ids);
        self.emit_event(TreeEvent::SubjectDeleted {
            id: id.to_string(),
            deleted_ids: deleted.deleted_ids.clone(),
        });
        Ok(deleted)
    }

    async fn delete_in_batch(&self, id: &str) -> Result<DeleteResult, TreeError> {
        let subject = self.ensure_in_scope(id, false).await?;
        self.hooks.on_delete(&subject)?;

        let deleted = self.store.delete(id).await?;
        normalize_sorts(self.store.as_ref(), subject.parent_id.as_deref()).await?;
        NestedSetIndex::repair(self.store.as_ref(), None).await?;
        Ok(deleted)
    }

    /// Apply a flat reorder: new parent and position per subject
    ///
    /// Every touched sibling group is renumbered to `0..n-1` afterwards, so
    /// positions only need to be relative. Moving a subject below one of its
    /// own descendants fails with `CycleDetected`.
    #[tracing::instrument(skip(self, items), fields(items = items.len()))]
    pub async fn reorder(&self, items: &[ReorderItem]) -> Result<Vec<String>, TreeError> {
        if !self.config.reorderable {
            return Err(TreeError::action_disabled("reorder"));
        }

        let _write = self.gate.write().await;
        self.store.begin_batch().await?;
        let result = self.reorder_in_batch(items).await;
        let changed = self.finish_batch(result).await?;

        self.emit_event(TreeEvent::SubjectsReordered {
            ids: changed.clone(),
        });
        Ok(changed)
    }

    async fn reorder_in_batch(&self, items: &[ReorderItem]) -> Result<Vec<String>, TreeError> {
        let anchors = self.store.protected_anchors().await?;
        let mut changed: BTreeSet<String> = BTreeSet::new();
        let mut groups: BTreeSet<Option<String>> = BTreeSet::new();
        let mut moved = false;

        for item in items {
            let subject = self.ensure_in_scope(&item.id, false).await?;
            let parent_id = item
                .parent_id
                .as_deref()
                .or(self.scope.top_parent())
                .map(str::to_string);
            if let Some(parent_id) = parent_id.as_deref() {
                self.ensure_in_scope(parent_id, true).await?;
            }

            if subject.parent_id != parent_id {
                if anchors.contains(&subject.id) {
                    return Err(TreeError::protected(subject.id.clone()));
                }
                self.store.reparent(&subject.id, parent_id.as_deref()).await?;
                groups.insert(subject.parent_id.clone());
                changed.insert(subject.id.clone());
                moved = true;
            }
            if subject.sort != item.sort {
                self.store.set_sort(&subject.id, item.sort).await?;
                changed.insert(subject.id.clone());
            }
            groups.insert(parent_id);
        }

        for group in &groups {
            changed.extend(normalize_sorts(self.store.as_ref(), group.as_deref()).await?);
        }

        // Pure reorder within one parent keeps the subtree's members
        let repair_scope = match (moved, groups.len()) {
            (false, 1) => groups.iter().next().cloned().flatten(),
            _ => None,
        };
        NestedSetIndex::repair(self.store.as_ref(), repair_scope.as_deref()).await?;

        Ok(changed.into_iter().collect())
    }

    //
    // HELPERS
    //

    /// Load a subject visible in this scope; anything else is `NotFound`
    ///
    /// The scope anchor is only accepted as a parent.
    async fn ensure_in_scope(&self, id: &str, as_parent: bool) -> Result<Subject, TreeError> {
        if !as_parent && self.scope.anchor_id() == Some(id) {
            return Err(TreeError::protected(id));
        }

        let subject = self
            .store
            .find(id)
            .await?
            .ok_or_else(|| TreeError::not_found(id))?;

        if let Some(anchor_id) = self.scope.anchor_id() {
            if subject.id != anchor_id {
                let ancestors = self.store.ancestors_of(id).await?;
                if !ancestors.iter().any(|a| a.id == anchor_id) {
                    return Err(TreeError::not_found(id));
                }
            }
        }
        Ok(subject)
    }

    /// Commit on success, roll back on error
    async fn finish_batch<T>(&self, result: Result<T, TreeError>) -> Result<T, TreeError> {
        let result = match result {
            Ok(value) => self.store.commit_batch().await.map(|()| value),
            Err(err) => Err(err),
        };

        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::warn!("Batch rolled back: {}", err);
                if let Err(rollback_err) = self.store.rollback_batch().await {
                    tracing::error!("Rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }
}
