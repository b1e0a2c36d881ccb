//! Subject Data Structures
//!
//! A `Subject` is one persisted node of the subject tree. Structure lives in
//! `parent_id` + `sort`; the nested-set bounds (`left_bound`, `right_bound`)
//! are derived data owned by the nested-set index and rewritten once per
//! batch.
//!
//! Every attribute other than the label is kept in the `properties` JSON
//! column; new fillable fields never need a schema change.
//!
//! # Examples
//!
//! ```rust
//! use subject_tree_core::models::{Subject, SubjectAttributes};
//! use serde_json::json;
//!
//! let attributes = SubjectAttributes::new("Mathematics").with_property("code", json!("MATH"));
//! let subject = Subject::new(attributes, None, 0);
//! assert_eq!(subject.name, "Mathematics");
//! assert!(subject.parent_id.is_none());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Raw attribute map as submitted by an editor (label + fillable fields)
pub type Attributes = Map<String, Value>;

/// Validation errors for subject attributes
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Field must not be empty: {0}")]
    EmptyField(String),

    #[error("Attribute '{0}' must be a scalar value")]
    NonScalarAttribute(String),

    #[error("Anchor subject cannot be modified from its own scope: {0}")]
    ProtectedAnchor(String),

    #[error("Snapshot nesting exceeds the maximum depth of {0}")]
    DepthExceeded(usize),
}

/// Label plus fillable properties of a subject
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubjectAttributes {
    pub name: String,

    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl SubjectAttributes {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Split an editor attribute map into label and properties
    ///
    /// `label_key` names the attribute holding the subject name (`name` by
    /// default). Values must be scalars; `null` properties are kept so that
    /// clearing a field round-trips.
    pub fn from_map(map: &Attributes, label_key: &str) -> Result<Self, ValidationError> {
        let name = match map.get(label_key) {
            None | Some(Value::Null) => {
                return Err(ValidationError::MissingField(label_key.to_string()))
            }
            Some(Value::String(name)) => name.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(_) => return Err(ValidationError::NonScalarAttribute(label_key.to_string())),
        };

        let mut properties = Map::new();
        for (key, value) in map {
            if key == label_key {
                continue;
            }
            if value.is_array() || value.is_object() {
                return Err(ValidationError::NonScalarAttribute(key.clone()));
            }
            properties.insert(key.clone(), value.clone());
        }

        Ok(Self { name, properties })
    }

    /// Inverse of [`SubjectAttributes::from_map`]
    pub fn to_map(&self, label_key: &str) -> Attributes {
        let mut map = Map::new();
        map.insert(label_key.to_string(), Value::String(self.name.clone()));
        for (key, value) in &self.properties {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

/// Persisted subject node
///
/// # Fields
///
/// - `id`: Server-assigned UUID, immutable once created
/// - `parent_id`: Parent subject (None = forest root)
/// - `name`: Display label
/// - `sort`: Position among siblings, contiguous from 0
/// - `left_bound` / `right_bound`: Nested-set encoding, valid after every batch
/// - `properties`: Remaining fillable attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,

    pub parent_id: Option<String>,

    pub name: String,

    pub sort: i64,

    pub left_bound: i64,

    pub right_bound: i64,

    #[serde(default)]
    pub properties: Map<String, Value>,

    pub modified_at: DateTime<Utc>,
}

impl Subject {
    /// Create an unsaved subject with a fresh UUID and unassigned bounds
    pub fn new(attributes: SubjectAttributes, parent_id: Option<String>, sort: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id,
            name: attributes.name,
            sort,
            left_bound: 0,
            right_bound: 0,
            properties: attributes.properties,
            modified_at: Utc::now(),
        }
    }

    pub fn attributes(&self) -> SubjectAttributes {
        SubjectAttributes {
            name: self.name.clone(),
            properties: self.properties.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Number of subjects in this subtree (including itself) per the bounds
    pub fn subtree_size(&self) -> i64 {
        (self.right_bound - self.left_bound + 1) / 2
    }

    /// Range test: is `other` strictly inside this subject's bounds?
    pub fn contains(&self, other: &Subject) -> bool {
        other.left_bound > self.left_bound && other.right_bound < self.right_bound
    }
}

/// Parameters for creating a subject
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubject {
    pub attributes: SubjectAttributes,
    pub parent_id: Option<String>,
    pub sort: i64,
}

/// Result of a (cascading) delete
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// Every removed id, subtree root first
    pub deleted_ids: Vec<String>,
}

impl DeleteResult {
    pub fn deleted_count(&self) -> usize {
        self.deleted_ids.len()
    }
}
