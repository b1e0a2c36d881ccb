//! MemoryStore - SubjectStore Implementation without a Database
//!
//! Keeps subjects and departments in maps behind a tokio mutex. A batch takes
//! a full copy of the state on `begin_batch` and restores it on
//! `rollback_batch`, which gives the same all-or-nothing behavior as a SQL
//! transaction for the forest sizes this store is meant for (tests, tooling,
//! embedders that persist snapshots themselves).

use crate::db::subject_store::{collect_subtree, NodeBounds, SubjectStore, TreeLink};
use crate::models::{DeleteResult, Department, NewSubject, Subject, SubjectAttributes};
use crate::tree::TreeError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    subjects: HashMap<String, Subject>,
    departments: HashMap<String, Department>,
}

impl MemoryState {
    fn require(&self, id: &str) -> Result<&Subject, TreeError> {
        self.subjects.get(id).ok_or_else(|| TreeError::not_found(id))
    }

    fn require_mut(&mut self, id: &str) -> Result<&mut Subject, TreeError> {
        self.subjects
            .get_mut(id)
            .ok_or_else(|| TreeError::not_found(id))
    }

    fn links(&self) -> Vec<TreeLink> {
        self.subjects.values().map(TreeLink::from).collect()
    }

    fn sorted(mut subjects: Vec<Subject>) -> Vec<Subject> {
        subjects.sort_by(|a, b| a.sort.cmp(&b.sort).then_with(|| a.id.cmp(&b.id)));
        subjects
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: MemoryState,

    /// State captured at `begin_batch`, restored on rollback
    checkpoint: Option<MemoryState>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubjectStore for MemoryStore {
    async fn find(&self, id: &str) -> Result<Option<Subject>, TreeError> {
        let inner = self.inner.lock().await;
        Ok(inner.state.subjects.get(id).cloned())
    }

    async fn children_of(&self, parent_id: Option<&str>) -> Result<Vec<Subject>, TreeError> {
        let inner = self.inner.lock().await;
        let children = inner
            .state
            .subjects
            .values()
            .filter(|s| s.parent_id.as_deref() == parent_id)
            .cloned()
            .collect();
        Ok(MemoryState::sorted(children))
    }

    async fn descendants_of(&self, id: &str) -> Result<Vec<Subject>, TreeError> {
        let inner = self.inner.lock().await;
        let node = inner.state.require(id)?;
        let mut descendants: Vec<Subject> = inner
            .state
            .subjects
            .values()
            .filter(|s| node.contains(s))
            .cloned()
            .collect();
        descendants.sort_by_key(|s| s.left_bound);
        Ok(descendants)
    }

    async fn ancestors_of(&self, id: &str) -> Result<Vec<Subject>, TreeError> {
        let inner = self.inner.lock().await;
        let node = inner.state.require(id)?;
        let mut ancestors: Vec<Subject> = inner
            .state
            .subjects
            .values()
            .filter(|s| s.contains(node))
            .cloned()
            .collect();
        ancestors.sort_by_key(|s| s.left_bound);
        Ok(ancestors)
    }

    async fn all_subjects(&self) -> Result<Vec<Subject>, TreeError> {
        let inner = self.inner.lock().await;
        let mut subjects: Vec<Subject> = inner.state.subjects.values().cloned().collect();
        subjects.sort_by(|a, b| {
            a.left_bound
                .cmp(&b.left_bound)
                .then_with(|| a.sort.cmp(&b.sort))
        });
        Ok(subjects)
    }

    async fn max_child_sort(&self, parent_id: Option<&str>) -> Result<Option<i64>, TreeError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .state
            .subjects
            .values()
            .filter(|s| s.parent_id.as_deref() == parent_id)
            .map(|s| s.sort)
            .max())
    }

    async fn forest_links(&self) -> Result<Vec<TreeLink>, TreeError> {
        let inner = self.inner.lock().await;
        Ok(inner.state.links())
    }

    async fn create(&self, subject: NewSubject) -> Result<Subject, TreeError> {
        let mut inner = self.inner.lock().await;
        if let Some(parent_id) = subject.parent_id.as_deref() {
            inner.state.require(parent_id)?;
        }

        let created = Subject::new(subject.attributes, subject.parent_id, subject.sort);
        inner
            .state
            .subjects
            .insert(created.id.clone(), created.clone());
        tracing::debug!("Created subject {} under {:?}", created.id, created.parent_id);
        Ok(created)
    }

    async fn update(&self, id: &str, attributes: SubjectAttributes) -> Result<Subject, TreeError> {
        let mut inner = self.inner.lock().await;
        let subject = inner.state.require_mut(id)?;
        subject.name = attributes.name;
        subject.properties = attributes.properties;
        subject.modified_at = Utc::now();
        Ok(subject.clone())
    }

    async fn reparent(&self, id: &str, new_parent_id: Option<&str>) -> Result<(), TreeError> {
        if new_parent_id == Some(id) {
            return Err(TreeError::cycle(vec![id.to_string()]));
        }

        let mut inner = self.inner.lock().await;
        if let Some(parent_id) = new_parent_id {
            inner.state.require(parent_id)?;
        }
        let subject = inner.state.require_mut(id)?;
        subject.parent_id = new_parent_id.map(str::to_string);
        subject.modified_at = Utc::now();
        Ok(())
    }

    async fn set_sort(&self, id: &str, sort: i64) -> Result<(), TreeError> {
        let mut inner = self.inner.lock().await;
        inner.state.require_mut(id)?.sort = sort;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<DeleteResult, TreeError> {
        let mut inner = self.inner.lock().await;
        inner.state.require(id)?;

        let subtree = collect_subtree(&inner.state.links(), id);
        let anchors: HashSet<&str> = inner
            .state
            .departments
            .values()
            .map(|d| d.root_subject_id.as_str())
            .collect();
        if let Some(anchor) = subtree.iter().find(|s| anchors.contains(s.as_str())) {
            return Err(TreeError::protected(anchor.clone()));
        }

        for subject_id in &subtree {
            inner.state.subjects.remove(subject_id);
        }
        Ok(DeleteResult {
            deleted_ids: subtree,
        })
    }

    async fn write_bounds(&self, bounds: &[NodeBounds]) -> Result<(), TreeError> {
        let mut inner = self.inner.lock().await;
        for entry in bounds {
            let subject = inner.state.require_mut(&entry.id)?;
            subject.left_bound = entry.left_bound;
            subject.right_bound = entry.right_bound;
        }
        Ok(())
    }

    async fn create_department(
        &self,
        name: &str,
        root_subject_id: &str,
    ) -> Result<Department, TreeError> {
        let mut inner = self.inner.lock().await;
        inner.state.require(root_subject_id)?;

        let department = Department::new(name, root_subject_id);
        inner
            .state
            .departments
            .insert(department.id.clone(), department.clone());
        Ok(department)
    }

    async fn find_department(&self, id: &str) -> Result<Option<Department>, TreeError> {
        let inner = self.inner.lock().await;
        Ok(inner.state.departments.get(id).cloned())
    }

    async fn protected_anchors(&self) -> Result<HashSet<String>, TreeError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .state
            .departments
            .values()
            .map(|d| d.root_subject_id.clone())
            .collect())
    }

    async fn begin_batch(&self) -> Result<(), TreeError> {
        let mut inner = self.inner.lock().await;
        inner.checkpoint = Some(inner.state.clone());
        Ok(())
    }

    async fn commit_batch(&self) -> Result<(), TreeError> {
        let mut inner = self.inner.lock().await;
        inner.checkpoint = None;
        Ok(())
    }

    async fn rollback_batch(&self) -> Result<(), TreeError> {
        let mut inner = self.inner.lock().await;
        if let Some(checkpoint) = inner.checkpoint.take() {
            inner.state = checkpoint;
        }
        Ok(())
    }
}
