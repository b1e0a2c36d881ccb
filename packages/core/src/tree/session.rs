//! Edit Session Record Cache
//!
//! Remembers which persisted subject stands behind a client key for records
//! added during this session: keys the editor binds to subjects created by
//! editor actions, and the keys of snapshot entries created by a reconcile.
//! The reconciler consults the cache for entries that carry no id.
//!
//! Rendered records are not cached. A rendered entry always carries its id,
//! so an id-less entry under a rendered key is a new subject.
//!
//! The cache is advisory: a cached record is re-read from the store before
//! use, so a stale entry can never resurrect a deleted subject.

use crate::models::Subject;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct EditSession {
    records: HashMap<String, Subject>,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache under an explicit client key
    pub fn cache_record(&mut self, client_key: impl Into<String>, subject: Subject) {
        self.records.insert(client_key.into(), subject);
    }

    pub fn forget_record(&mut self, client_key: &str) -> Option<Subject> {
        self.records.remove(client_key)
    }

    /// Drop every key pointing at one of `ids`
    pub fn forget_ids(&mut self, ids: &[String]) {
        self.records.retain(|_, subject| !ids.contains(&subject.id));
    }

    /// Keep only keys whose subject is in `ids`
    pub fn retain_ids(&mut self, ids: &HashSet<String>) {
        self.records.retain(|_, subject| ids.contains(&subject.id));
    }

    pub fn resolve(&self, client_key: &str) -> Option<&Subject> {
        self.records.get(client_key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
