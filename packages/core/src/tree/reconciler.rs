//! Tree Snapshot Reconciler
//!
//! Diffs a submitted [`ClientSnapshot`] against the persisted forest and
//! applies the difference as one batch.
//!
//! # Phases
//!
//! 1. **Flatten**: depth-first pre-order walk of the snapshot into
//!    [`FlatEntry`] rows (client key, id, attributes, parent row, position).
//! 2. **Plan** (reads only): resolve every row to an existing subject or a
//!    create, validate attributes through the lifecycle hooks, assign
//!    contiguous sibling positions, and pick the deletion roots.
//! 3. **Apply** (inside one batch): detach rescued subjects, delete, upsert
//!    parents before children, close sort gaps left in untouched groups, and
//!    repair the nested-set bounds once.
//!
//! Any error during apply rolls the whole batch back.
//!
//! # Anchors
//!
//! Subjects referenced by a department are protected. An anchored scope never
//! shows its own anchor; entries naming it fail with `ProtectedNode`. An
//! anchor omitted from a snapshot is kept together with its subtree and its
//! in-scope ancestors. A submitted anchor may be renamed or reordered but
//! never moved to another parent.

use crate::config::TreeConfig;
use crate::db::events::ReconcileSummary;
use crate::db::{collect_subtree, SubjectStore, TreeLink};
use crate::models::{
    Attributes, ClientSnapshot, NewSubject, SnapshotEntry, Subject, SubjectAttributes,
    ValidationError,
};
use crate::tree::{
    EditSession, EntryValidationError, NestedSetIndex, RepairStats, TreeError, TreeHooks,
    TreeScope,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One snapshot entry, flattened
#[derive(Debug, Clone, PartialEq)]
pub struct FlatEntry {
    pub client_key: String,
    pub id: Option<String>,
    pub attributes: Attributes,

    /// Row index of the enclosing entry; `None` for top-level entries
    pub parent_entry: Option<usize>,

    /// Position among the submitted siblings
    pub order_index: usize,

    /// Nesting level, 1 for top-level entries
    pub depth: usize,
}

/// Where a planned subject will hang
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlanParent {
    /// Top of the scope (forest root or the anchor)
    Root,

    /// An existing subject
    Persisted(String),

    /// A subject created earlier in the same batch, by row index
    Entry(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanTarget {
    Existing(Subject),
    New,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedUpsert {
    pub entry: usize,
    pub client_key: String,
    pub target: PlanTarget,
    pub attributes: SubjectAttributes,
    pub parent: PlanParent,
    pub sort: i64,
}

/// A non-submitted subject that stays in a regrouped sibling list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetainedSort {
    pub id: String,
    pub previous_sort: i64,
    pub sort: i64,
}

/// An entry dropped because a later entry named the same subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateEntry {
    pub client_key: String,
    pub id: String,
    pub kept_client_key: String,
}

/// Mutation set derived from a snapshot, in apply order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Submitted subjects detached from a subtree about to be deleted
    pub rescues: Vec<String>,

    /// Deletion roots; descendants go by cascade
    pub deletions: Vec<Subject>,

    /// Parent-before-child order
    pub upserts: Vec<PlannedUpsert>,

    pub retained: Vec<RetainedSort>,

    /// Sibling groups outside the snapshot that lose members
    pub normalize: Vec<Option<String>>,

    pub duplicates: Vec<DuplicateEntry>,
}

impl ReconcilePlan {
    pub fn creates(&self) -> usize {
        self.upserts
            .iter()
            .filter(|u| u.target == PlanTarget::New)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEntry {
    pub client_key: String,
    pub id: String,
}

/// What an applied plan changed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub created: Vec<CreatedEntry>,
    pub updated: Vec<String>,
    pub reparented: Vec<String>,
    pub reordered: Vec<String>,

    /// Every removed id, cascades included
    pub deleted: Vec<String>,

    pub duplicates: Vec<DuplicateEntry>,
    pub repair: RepairStats,
}

impl ReconcileReport {
    pub fn summary(&self) -> ReconcileSummary {
        ReconcileSummary {
            created: self.created.len(),
            updated: self.updated.len(),
            reparented: self.reparented.len(),
            reordered: self.reordered.len(),
            deleted: self.deleted.len(),
        }
    }

    /// Nothing structural or attribute-wise was written
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
            && self.updated.is_empty()
            && self.reparented.is_empty()
            && self.reordered.is_empty()
            && self.deleted.is_empty()
    }
}

/// Knobs taken from [`TreeConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub label_key: String,
    pub max_depth: usize,
    pub allow_create: bool,
    pub allow_delete: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self::from(&TreeConfig::default())
    }
}

impl From<&TreeConfig> for ReconcileOptions {
    fn from(config: &TreeConfig) -> Self {
        Self {
            label_key: config.label_key.clone(),
            max_depth: config.max_depth,
            allow_create: config.addable,
            allow_delete: config.deletable,
        }
    }
}

/// Flatten a snapshot in depth-first pre-order
///
/// Fails with `ValidationFailed(DepthExceeded)` for nesting deeper than
/// `max_depth`.
pub fn flatten(snapshot: &ClientSnapshot, max_depth: usize) -> Result<Vec<FlatEntry>, TreeError> {
    struct Pending<'s> {
        key: &'s str,
        entry: &'s SnapshotEntry,
        parent: Option<usize>,
        order_index: usize,
        depth: usize,
    }

    let mut rows: Vec<FlatEntry> = Vec::with_capacity(snapshot.total_len());
    let mut stack: Vec<Pending<'_>> = snapshot
        .iter()
        .enumerate()
        .rev()
        .map(|(order_index, (key, entry))| Pending {
            key,
            entry,
            parent: None,
            order_index,
            depth: 1,
        })
        .collect();

    while let Some(pending) = stack.pop() {
        if pending.depth > max_depth {
            return Err(TreeError::ValidationFailed {
                errors: vec![EntryValidationError {
                    client_key: Some(pending.key.to_string()),
                    id: pending.entry.id.clone(),
                    error: ValidationError::DepthExceeded(max_depth),
                }],
            });
        }

        let row = rows.len();
        rows.push(FlatEntry {
            client_key: pending.key.to_string(),
            id: pending.entry.id.clone(),
            attributes: pending.entry.attributes.clone(),
            parent_entry: pending.parent,
            order_index: pending.order_index,
            depth: pending.depth,
        });

        stack.extend(
            pending
                .entry
                .children
                .iter()
                .enumerate()
                .rev()
                .map(|(order_index, (key, entry))| Pending {
                    key,
                    entry,
                    parent: Some(row),
                    order_index,
                    depth: pending.depth + 1,
                }),
        );
    }

    Ok(rows)
}

pub struct TreeSnapshotReconciler<'a> {
    store: &'a dyn SubjectStore,
    scope: &'a TreeScope,
    hooks: &'a dyn TreeHooks,
    session: Option<&'a EditSession>,
    options: ReconcileOptions,
}

impl<'a> TreeSnapshotReconciler<'a> {
    pub fn new(store: &'a dyn SubjectStore, scope: &'a TreeScope, hooks: &'a dyn TreeHooks) -> Self {
        Self {
            store,
            scope,
            hooks,
            session: None,
            options: ReconcileOptions::default(),
        }
    }

    pub fn with_session(mut self, session: &'a EditSession) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    /// Plan and apply `snapshot` as one batch
    pub async fn reconcile(&self, snapshot: &ClientSnapshot) -> Result<ReconcileReport, TreeError> {
        self.store.begin_batch().await?;

        let result = match self.plan(snapshot).await {
            Ok(plan) => self.apply(&plan).await,
            Err(err) => Err(err),
        };
        // A failed COMMIT leaves the transaction open, so it is rolled back too
        let result = match result {
            Ok(report) => self.store.commit_batch().await.map(|()| report),
            Err(err) => Err(err),
        };

        match result {
            Ok(report) => {
                tracing::info!(
                    "Reconciled snapshot: {} created, {} updated, {} reparented, {} reordered, {} deleted",
                    report.created.len(),
                    report.updated.len(),
                    report.reparented.len(),
                    report.reordered.len(),
                    report.deleted.len()
                );
                Ok(report)
            }
            Err(err) => {
                tracing::warn!("Reconciliation rolled back: {}", err);
                if let Err(rollback_err) = self.store.rollback_batch().await {
                    tracing::error!("Rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Derive the mutation set for `snapshot` without writing anything
    pub async fn plan(&self, snapshot: &ClientSnapshot) -> Result<ReconcilePlan, TreeError> {
        let rows = flatten(snapshot, self.options.max_depth)?;

        let subjects: HashMap<String, Subject> = self
            .store
            .all_subjects()
            .await?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        let anchors = self.store.protected_anchors().await?;
        let top_parent = self.scope.top_parent();

        if let Some(anchor_id) = top_parent {
            if !subjects.contains_key(anchor_id) {
                return Err(TreeError::not_found(anchor_id));
            }
        }

        let links: Vec<TreeLink> = subjects.values().map(TreeLink::from).collect();
        let in_scope: HashSet<String> = match top_parent {
            None => subjects.keys().cloned().collect(),
            Some(anchor_id) => collect_subtree(&links, anchor_id).into_iter().skip(1).collect(),
        };

        let targets = self.resolve_rows(&rows, &subjects, &in_scope)?;
        let (dropped, duplicates) = find_duplicates(&rows, &targets);
        let attributes = self.validate_rows(&rows, &targets, &dropped, &subjects)?;

        // Final parent and sibling position of every kept row
        let parents: Vec<PlanParent> = rows
            .iter()
            .map(|row| match row.parent_entry {
                None => PlanParent::Root,
                Some(p) => match &targets[p] {
                    Some(id) => PlanParent::Persisted(id.clone()),
                    None => PlanParent::Entry(p),
                },
            })
            .collect();

        let mut next_sort: HashMap<PlanParent, i64> = HashMap::new();
        let mut upserts = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            if dropped[index] {
                continue;
            }
            let parent = parents[index].clone();
            let slot = next_sort.entry(parent.clone()).or_insert(0);
            let sort = *slot;
            *slot += 1;

            let target = match &targets[index] {
                Some(id) => {
                    let existing = subjects
                        .get(id)
                        .cloned()
                        .ok_or_else(|| TreeError::not_found_for_entry(id, &row.client_key))?;
                    if anchors.contains(id)
                        && moves_away(&parent, top_parent, existing.parent_id.as_deref())
                    {
                        return Err(TreeError::protected_entry(id, &row.client_key));
                    }
                    PlanTarget::Existing(existing)
                }
                None => PlanTarget::New,
            };

            upserts.push(PlannedUpsert {
                entry: index,
                client_key: row.client_key.clone(),
                target,
                attributes: attributes[index].clone().unwrap_or_default(),
                parent,
                sort,
            });
        }

        let submitted: HashSet<&str> = targets.iter().flatten().map(String::as_str).collect();
        let shielded = shield_omitted_anchors(&anchors, &in_scope, &submitted, &subjects, &links);

        let candidates: HashSet<&str> = in_scope
            .iter()
            .map(String::as_str)
            .filter(|id| !submitted.contains(id) && !shielded.contains(*id))
            .collect();

        let mut deletions: Vec<Subject> = candidates
            .iter()
            .filter_map(|id| subjects.get(*id))
            .filter(|s| {
                s.parent_id
                    .as_deref()
                    .map_or(true, |parent_id| !candidates.contains(parent_id))
            })
            .cloned()
            .collect();
        deletions.sort_by(|a, b| {
            a.left_bound
                .cmp(&b.left_bound)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut rescues = Vec::new();
        for root in &deletions {
            for id in collect_subtree(&links, &root.id).into_iter().skip(1) {
                let parent_submitted = subjects
                    .get(&id)
                    .and_then(|s| s.parent_id.as_deref())
                    .map_or(false, |parent_id| submitted.contains(parent_id));
                if submitted.contains(id.as_str()) && !parent_submitted {
                    rescues.push(id);
                }
            }
        }

        if !self.options.allow_delete && !deletions.is_empty() {
            return Err(TreeError::action_disabled("delete"));
        }
        if !self.options.allow_create && upserts.iter().any(|u| u.target == PlanTarget::New) {
            return Err(TreeError::action_disabled("add"));
        }

        // Groups the snapshot fully defines, by current parent id
        let mut planned_groups: HashSet<Option<&str>> = HashSet::new();
        planned_groups.insert(top_parent);
        planned_groups.extend(submitted.iter().map(|id| Some(*id)));

        let retained = retained_sorts(
            &subjects,
            &planned_groups,
            &submitted,
            &candidates,
            &next_sort,
            top_parent,
        );

        let mut touched: Vec<Option<&str>> = deletions
            .iter()
            .map(|root| root.parent_id.as_deref())
            .collect();
        for upsert in &upserts {
            if let PlanTarget::Existing(existing) = &upsert.target {
                if moves_away(&upsert.parent, top_parent, existing.parent_id.as_deref()) {
                    touched.push(existing.parent_id.as_deref());
                }
            }
        }

        let mut normalize: Vec<Option<String>> = Vec::new();
        for group in touched {
            let deleted = group.map_or(false, |id| candidates.contains(id));
            let owned = group.map(str::to_string);
            if !planned_groups.contains(&group) && !deleted && !normalize.contains(&owned) {
                normalize.push(owned);
            }
        }

        tracing::debug!(
            "Planned reconciliation: {} rows, {} deletion roots, {} rescues, {} duplicates",
            rows.len(),
            deletions.len(),
            rescues.len(),
            duplicates.len()
        );

        Ok(ReconcilePlan {
            rescues,
            deletions,
            upserts,
            retained,
            normalize,
            duplicates,
        })
    }

    /// Execute a plan; the caller owns the surrounding batch
    pub async fn apply(&self, plan: &ReconcilePlan) -> Result<ReconcileReport, TreeError> {
        let store = self.store;
        let top_parent = self.scope.top_parent();
        let mut report = ReconcileReport {
            duplicates: plan.duplicates.clone(),
            ..ReconcileReport::default()
        };

        for id in &plan.rescues {
            store.reparent(id, None).await?;
        }

        for subject in &plan.deletions {
            self.hooks.on_delete(subject)?;
            let result = store.delete(&subject.id).await?;
            tracing::debug!("Deleted subtree {} ({} subjects)", subject.id, result.deleted_count());
            report.deleted.extend(result.deleted_ids);
        }

        let mut created: HashMap<usize, String> = HashMap::new();
        for upsert in &plan.upserts {
            let parent_id = match &upsert.parent {
                PlanParent::Root => top_parent.map(str::to_string),
                PlanParent::Persisted(id) => Some(id.clone()),
                PlanParent::Entry(row) => Some(created.get(row).cloned().ok_or_else(|| {
                    TreeError::not_found_for_entry(format!("row {}", row), &upsert.client_key)
                })?),
            };

            match &upsert.target {
                PlanTarget::New => {
                    let subject = store
                        .create(NewSubject {
                            attributes: upsert.attributes.clone(),
                            parent_id,
                            sort: upsert.sort,
                        })
                        .await
                        .map_err(|e| e.with_client_key(&upsert.client_key))?;
                    created.insert(upsert.entry, subject.id.clone());
                    report.created.push(CreatedEntry {
                        client_key: upsert.client_key.clone(),
                        id: subject.id,
                    });
                }
                PlanTarget::Existing(existing) => {
                    let id = existing.id.as_str();
                    if upsert.attributes != existing.attributes() {
                        store
                            .update(id, upsert.attributes.clone())
                            .await
                            .map_err(|e| e.with_client_key(&upsert.client_key))?;
                        report.updated.push(id.to_string());
                    }
                    if existing.parent_id != parent_id {
                        store
                            .reparent(id, parent_id.as_deref())
                            .await
                            .map_err(|e| e.with_client_key(&upsert.client_key))?;
                        report.reparented.push(id.to_string());
                    }
                    if existing.sort != upsert.sort {
                        store.set_sort(id, upsert.sort).await?;
                        report.reordered.push(id.to_string());
                    }
                }
            }
        }

        for retained in &plan.retained {
            if retained.previous_sort != retained.sort {
                store.set_sort(&retained.id, retained.sort).await?;
                report.reordered.push(retained.id.clone());
            }
        }

        for group in &plan.normalize {
            let changed = normalize_sorts(store, group.as_deref()).await?;
            report.reordered.extend(changed);
        }

        report.repair = NestedSetIndex::repair(store, None).await?;
        Ok(report)
    }

    /// Existing subject id per row, or `None` for a create
    ///
    /// Only subjects below the scope's top are addressable; anything else,
    /// including subjects of another department, is `NotFound`.
    fn resolve_rows(
        &self,
        rows: &[FlatEntry],
        subjects: &HashMap<String, Subject>,
        in_scope: &HashSet<String>,
    ) -> Result<Vec<Option<String>>, TreeError> {
        let anchor_id = self.scope.anchor_id();
        let mut targets = Vec::with_capacity(rows.len());

        for row in rows {
            let resolved = match &row.id {
                Some(id) => Some(id.clone()),
                None => self
                    .session
                    .and_then(|session| session.resolve(&row.client_key))
                    .map(|cached| cached.id.clone())
                    .filter(|id| subjects.contains_key(id)),
            };

            if let Some(id) = resolved.as_deref() {
                if anchor_id == Some(id) {
                    return Err(TreeError::protected_entry(id, &row.client_key));
                }
                if !in_scope.contains(id) {
                    return Err(TreeError::not_found_for_entry(id, &row.client_key));
                }
            }
            targets.push(resolved);
        }

        Ok(targets)
    }

    /// Validate kept rows; every failure is reported at once
    fn validate_rows(
        &self,
        rows: &[FlatEntry],
        targets: &[Option<String>],
        dropped: &[bool],
        subjects: &HashMap<String, Subject>,
    ) -> Result<Vec<Option<SubjectAttributes>>, TreeError> {
        let mut errors = Vec::new();
        let mut validated = vec![None; rows.len()];

        for (index, row) in rows.iter().enumerate() {
            if dropped[index] {
                continue;
            }

            let existing = targets[index].as_deref().and_then(|id| subjects.get(id));
            let result = SubjectAttributes::from_map(&row.attributes, &self.options.label_key)
                .and_then(|mut attributes| {
                    match existing {
                        Some(subject) => self.hooks.before_save(&mut attributes, subject),
                        None => self.hooks.before_create(&mut attributes),
                    }
                    .map(|_| attributes)
                });

            match result {
                Ok(attributes) => validated[index] = Some(attributes),
                Err(error) => errors.push(EntryValidationError {
                    client_key: Some(row.client_key.clone()),
                    id: row.id.clone(),
                    error,
                }),
            }
        }

        if errors.is_empty() {
            Ok(validated)
        } else {
            Err(TreeError::ValidationFailed { errors })
        }
    }
}

/// Renumber one sibling group to `0..n-1`, keeping its current order
///
/// Returns the ids whose `sort` changed.
pub(crate) async fn normalize_sorts(
    store: &dyn SubjectStore,
    parent_id: Option<&str>,
) -> Result<Vec<String>, TreeError> {
    let mut siblings = store.children_of(parent_id).await?;
    siblings.sort_by(|a, b| a.sort.cmp(&b.sort).then_with(|| a.id.cmp(&b.id)));

    let mut changed = Vec::new();
    for (position, sibling) in siblings.iter().enumerate() {
        let sort = position as i64;
        if sibling.sort != sort {
            store.set_sort(&sibling.id, sort).await?;
            changed.push(sibling.id.clone());
        }
    }
    Ok(changed)
}

/// Whether a planned parent differs from the current `parent_id`
fn moves_away(parent: &PlanParent, top_parent: Option<&str>, current: Option<&str>) -> bool {
    match parent {
        PlanParent::Root => top_parent != current,
        PlanParent::Persisted(id) => current != Some(id.as_str()),
        PlanParent::Entry(_) => true,
    }
}

/// Mark every earlier row naming the same subject as a later row
fn find_duplicates(rows: &[FlatEntry], targets: &[Option<String>]) -> (Vec<bool>, Vec<DuplicateEntry>) {
    let mut last_row: HashMap<&str, usize> = HashMap::new();
    for (index, target) in targets.iter().enumerate() {
        if let Some(id) = target {
            last_row.insert(id.as_str(), index);
        }
    }

    let mut dropped = vec![false; rows.len()];
    let mut duplicates = Vec::new();
    for (index, target) in targets.iter().enumerate() {
        let Some(id) = target else { continue };
        let Some(&kept) = last_row.get(id.as_str()) else { continue };
        if kept != index {
            dropped[index] = true;
            tracing::warn!(
                "Duplicate snapshot entry '{}' for subject {}; keeping '{}'",
                rows[index].client_key,
                id,
                rows[kept].client_key
            );
            duplicates.push(DuplicateEntry {
                client_key: rows[index].client_key.clone(),
                id: id.clone(),
                kept_client_key: rows[kept].client_key.clone(),
            });
        }
    }

    (dropped, duplicates)
}

/// Omitted anchors in scope, their subtrees and their in-scope ancestors
fn shield_omitted_anchors(
    anchors: &HashSet<String>,
    in_scope: &HashSet<String>,
    submitted: &HashSet<&str>,
    subjects: &HashMap<String, Subject>,
    links: &[TreeLink],
) -> HashSet<String> {
    let mut omitted: Vec<&String> = anchors
        .iter()
        .filter(|id| in_scope.contains(*id) && !submitted.contains(id.as_str()))
        .collect();
    omitted.sort();

    let mut shielded: HashSet<String> = HashSet::new();
    for anchor_id in omitted {
        shielded.extend(collect_subtree(links, anchor_id));

        let mut cursor = subjects.get(anchor_id).and_then(|s| s.parent_id.clone());
        while let Some(parent_id) = cursor {
            if !in_scope.contains(&parent_id) || !shielded.insert(parent_id.clone()) {
                break;
            }
            cursor = subjects.get(&parent_id).and_then(|s| s.parent_id.clone());
        }
    }
    shielded
}

/// Positions for kept, non-submitted members of regrouped sibling lists
///
/// They follow the submitted siblings in their previous relative order.
fn retained_sorts(
    subjects: &HashMap<String, Subject>,
    planned_groups: &HashSet<Option<&str>>,
    submitted: &HashSet<&str>,
    candidates: &HashSet<&str>,
    next_sort: &HashMap<PlanParent, i64>,
    top_parent: Option<&str>,
) -> Vec<RetainedSort> {
    let mut kept: Vec<&Subject> = subjects
        .values()
        .filter(|s| planned_groups.contains(&s.parent_id.as_deref()))
        .filter(|s| !submitted.contains(s.id.as_str()) && !candidates.contains(s.id.as_str()))
        .collect();
    kept.sort_by(|a, b| a.sort.cmp(&b.sort).then_with(|| a.id.cmp(&b.id)));

    let mut offsets: HashMap<PlanParent, i64> = HashMap::new();
    let mut retained = Vec::with_capacity(kept.len());
    for subject in kept {
        let group = match subject.parent_id.as_deref() {
            Some(parent_id) if Some(parent_id) != top_parent => {
                PlanParent::Persisted(parent_id.to_string())
            }
            _ => PlanParent::Root,
        };
        let base = next_sort.get(&group).copied().unwrap_or(0);
        let offset = offsets.entry(group).or_insert(0);
        retained.push(RetainedSort {
            id: subject.id.clone(),
            previous_sort: subject.sort,
            sort: base + *offset,
        });
        *offset += 1;
    }
    retained
}
