//! Client Snapshot
//!
//! The nested, editor-facing representation of a subject tree. A snapshot is
//! an *ordered* map from client key to entry; the order of keys is the
//! sibling order. On the wire it is a plain JSON object:
//!
//! ```json
//! {
//!   "record-4f0c...": {
//!     "id": "0d6e...",
//!     "attributes": { "name": "Science" },
//!     "children": {
//!       "new-1": { "attributes": { "name": "Physics" }, "children": {} }
//!     }
//!   }
//! }
//! ```
//!
//! Entries without `id` are new subjects. Keys of rendered entries are
//! derived from the persisted id (see [`client_key_for`]) so that rendering
//! the same store twice yields identical keys.

use crate::models::Attributes;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// Namespace for deriving client keys from persisted ids
const CLIENT_KEY_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93d7_4b5a_8e21_0c7d_5f3b_a914);

/// Derive the stable client key for a persisted subject id
pub fn client_key_for(id: &str) -> String {
    let derived = Uuid::new_v5(&CLIENT_KEY_NAMESPACE, format!("record-{}", id).as_bytes());
    format!("record-{}", derived.simple())
}

/// One subject as seen by the editor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Persisted id; absent for subjects the editor just introduced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub attributes: Attributes,

    #[serde(default)]
    pub children: ClientSnapshot,
}

impl SnapshotEntry {
    pub fn new(id: Option<String>, attributes: Attributes) -> Self {
        Self {
            id,
            attributes,
            children: ClientSnapshot::new(),
        }
    }

    pub fn with_children(mut self, children: ClientSnapshot) -> Self {
        self.children = children;
        self
    }
}

/// Ordered client-key → entry map
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClientSnapshot {
    entries: Vec<(String, SnapshotEntry)>,
}

impl ClientSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry
    ///
    /// Replacing keeps the original position, matching JSON object semantics
    /// where a repeated key overwrites the earlier value.
    pub fn insert(&mut self, key: impl Into<String>, entry: SnapshotEntry) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = entry,
            None => self.entries.push((key, entry)),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, entry: SnapshotEntry) -> Self {
        self.insert(key, entry);
        self
    }

    pub fn get(&self, key: &str) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    pub fn iter(
        &self,
    ) -> impl DoubleEndedIterator<Item = (&str, &SnapshotEntry)> + ExactSizeIterator {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of entries at every depth
    pub fn total_len(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&ClientSnapshot> = vec![self];
        while let Some(level) = stack.pop() {
            count += level.len();
            stack.extend(level.entries.iter().map(|(_, e)| &e.children));
        }
        count
    }

    /// Find an entry anywhere in the tree by its persisted id
    pub fn find_by_id(&self, id: &str) -> Option<(&str, &SnapshotEntry)> {
        let mut stack: Vec<&ClientSnapshot> = vec![self];
        while let Some(level) = stack.pop() {
            for (key, entry) in &level.entries {
                if entry.id.as_deref() == Some(id) {
                    return Some((key.as_str(), entry));
                }
                stack.push(&entry.children);
            }
        }
        None
    }
}

impl Serialize for ClientSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, entry) in &self.entries {
            map.serialize_entry(key, entry)?;
        }
        map.end()
    }
}

struct ClientSnapshotVisitor;

impl<'de> Visitor<'de> for ClientSnapshotVisitor {
    type Value = ClientSnapshot;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of client keys to snapshot entries")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut snapshot = ClientSnapshot::new();
        while let Some((key, entry)) = access.next_entry::<String, SnapshotEntry>()? {
            snapshot.insert(key, entry);
        }
        Ok(snapshot)
    }

    // Editors sometimes send an empty children list as `[]`
    fn visit_seq<A: serde::de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        if seq.next_element::<serde::de::IgnoredAny>()?.is_some() {
            return Err(serde::de::Error::custom(
                "snapshot children must be an object keyed by client key",
            ));
        }
        Ok(ClientSnapshot::new())
    }
}

impl<'de> Deserialize<'de> for ClientSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ClientSnapshotVisitor)
    }
}
