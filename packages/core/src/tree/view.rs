//! Tree View
//!
//! Renders persisted subjects into the nested [`ClientSnapshot`] an editor
//! works on. Rendering reads the store on every call and keeps no state, so
//! two renders of an unchanged store are equal, keys included.

use crate::db::SubjectStore;
use crate::models::{client_key_for, ClientSnapshot, SnapshotEntry, Subject};
use crate::tree::{TreeError, TreeHooks, TreeScope};
use std::collections::HashMap;

/// A rendered snapshot plus the records behind its entries
#[derive(Debug, Clone, Default)]
pub struct RenderedTree {
    pub snapshot: ClientSnapshot,

    /// Rendered subjects in pre-order
    pub records: Vec<Subject>,
}

pub struct TreeView<'a> {
    store: &'a dyn SubjectStore,
    scope: &'a TreeScope,
    hooks: &'a dyn TreeHooks,
    label_key: String,
}

impl<'a> TreeView<'a> {
    pub fn new(store: &'a dyn SubjectStore, scope: &'a TreeScope, hooks: &'a dyn TreeHooks) -> Self {
        Self {
            store,
            scope,
            hooks,
            label_key: "name".to_string(),
        }
    }

    pub fn with_label_key(mut self, label_key: impl Into<String>) -> Self {
        self.label_key = label_key.into();
        self
    }

    pub async fn render(&self) -> Result<ClientSnapshot, TreeError> {
        Ok(self.render_with_records().await?.snapshot)
    }

    /// Render and hand back the subjects that were rendered
    ///
    /// The whole scope groups every subject by `parent_id`; an anchored scope
    /// reads the anchor's descendants through a bound range scan. Fails with
    /// `NotFound` for a missing anchor.
    pub async fn render_with_records(&self) -> Result<RenderedTree, TreeError> {
        let subjects = match self.scope {
            TreeScope::Whole => self.store.all_subjects().await?,
            TreeScope::Anchored { anchor_id } => {
                if self.store.find(anchor_id).await?.is_none() {
                    return Err(TreeError::not_found(anchor_id.clone()));
                }
                self.store.descendants_of(anchor_id).await?
            }
        };

        let mut groups: HashMap<Option<String>, Vec<Subject>> = HashMap::new();
        for subject in subjects {
            groups.entry(subject.parent_id.clone()).or_default().push(subject);
        }
        for siblings in groups.values_mut() {
            siblings.sort_by(|a, b| a.sort.cmp(&b.sort).then_with(|| a.id.cmp(&b.id)));
        }

        let mut records = Vec::new();
        let snapshot = build_level(
            self.scope.top_parent(),
            &groups,
            self.hooks,
            &self.label_key,
            &mut records,
        );

        tracing::debug!("Rendered {} subjects", records.len());
        Ok(RenderedTree { snapshot, records })
    }
}

fn build_level(
    parent_id: Option<&str>,
    groups: &HashMap<Option<String>, Vec<Subject>>,
    hooks: &dyn TreeHooks,
    label_key: &str,
    records: &mut Vec<Subject>,
) -> ClientSnapshot {
    let mut level = ClientSnapshot::new();
    let Some(siblings) = groups.get(&parent_id.map(str::to_string)) else {
        return level;
    };

    for subject in siblings {
        records.push(subject.clone());

        let mut attributes = subject.attributes().to_map(label_key);
        hooks.before_fill(subject, &mut attributes);

        let children = build_level(Some(&subject.id), groups, hooks, label_key, records);
        level.insert(
            client_key_for(&subject.id),
            SnapshotEntry::new(Some(subject.id.clone()), attributes).with_children(children),
        );
    }
    level
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NewSubject, SubjectAttributes};
    use crate::tree::{NestedSetIndex, PlainTreeHooks};

    async fn seed(store: &MemoryStore, name: &str, parent: Option<&str>, sort: i64) -> Subject {
        store
            .create(NewSubject {
                attributes: SubjectAttributes::new(name),
                parent_id: parent.map(str::to_string),
                sort,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_render_orders_children_by_sort() {
        let store = MemoryStore::new();
        let root = seed(&store, "Root", None, 0).await;
        seed(&store, "Second", Some(&root.id), 1).await;
        seed(&store, "First", Some(&root.id), 0).await;
        NestedSetIndex::repair(&store, None).await.unwrap();

        let scope = TreeScope::Whole;
        let hooks = PlainTreeHooks;
        let snapshot = TreeView::new(&store, &scope, &hooks).render().await.unwrap();

        let (_, root_entry) = snapshot.iter().next().unwrap();
        let names: Vec<_> = root_entry
            .children
            .iter()
            .map(|(_, e)| e.attributes["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn test_render_is_deterministic() {
        let store = MemoryStore::new();
        let root = seed(&store, "Root", None, 0).await;
        seed(&store, "Child", Some(&root.id), 0).await;
        NestedSetIndex::repair(&store, None).await.unwrap();

        let scope = TreeScope::Whole;
        let hooks = PlainTreeHooks;
        let view = TreeView::new(&store, &scope, &hooks);

        assert_eq!(view.render().await.unwrap(), view.render().await.unwrap());
    }

    #[tokio::test]
    async fn test_anchored_render_hides_anchor() {
        let store = MemoryStore::new();
        let anchor = seed(&store, "Anchor", None, 0).await;
        let inner = seed(&store, "Inner", Some(&anchor.id), 0).await;
        seed(&store, "Elsewhere", None, 1).await;
        NestedSetIndex::repair(&store, None).await.unwrap();

        let scope = TreeScope::anchored(anchor.id.clone());
        let hooks = PlainTreeHooks;
        let rendered = TreeView::new(&store, &scope, &hooks)
            .render_with_records()
            .await
            .unwrap();

        assert_eq!(rendered.snapshot.len(), 1);
        assert!(rendered.snapshot.get(&client_key_for(&inner.id)).is_some());
        assert_eq!(rendered.records.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_anchor_is_not_found() {
        let store = MemoryStore::new();
        let scope = TreeScope::anchored("missing");
        let hooks = PlainTreeHooks;

        let err = TreeView::new(&store, &scope, &hooks).render().await.unwrap_err();
        assert!(matches!(err, TreeError::NotFound { ref id, .. } if id == "missing"));
    }
}
