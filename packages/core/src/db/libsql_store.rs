//! LibsqlStore - SubjectStore Implementation for libsql (embedded SQLite)
//!
//! # Schema
//!
//! ```sql
//! subjects(id TEXT PK, parent_id TEXT NULL, name TEXT, sort INTEGER,
//!          lft INTEGER, rgt INTEGER, properties JSON, modified_at DATETIME)
//! departments(id TEXT PK, name TEXT, root_subject_id TEXT)
//! ```
//!
//! `(parent_id, sort)` serves ordered child listing, `(lft, rgt)` serves the
//! nested-set range scans for descendants and ancestors.
//!
//! # Connection Model
//!
//! The store holds a single connection for its lifetime. That keeps
//! `:memory:` databases alive across calls and lets a batch span many
//! statements with plain `BEGIN IMMEDIATE` / `COMMIT` / `ROLLBACK`. The tree
//! service serializes writers, so the connection is never shared by two
//! batches at once.

use crate::config::TreeConfig;
use crate::db::error::{BatchStep, DatabaseError};
use crate::db::subject_store::{collect_subtree, NodeBounds, SubjectStore, TreeLink};
use crate::models::{DeleteResult, Department, NewSubject, Subject, SubjectAttributes};
use crate::tree::TreeError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::params::IntoParams;
use libsql::{Builder, Connection, Database, Row};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use uuid::Uuid;

const SUBJECT_COLUMNS: &str = "id, parent_id, name, sort, lft, rgt, properties, modified_at";

pub struct LibsqlStore {
    /// Kept alive for the lifetime of the connection
    _db: Database,

    conn: Connection,

    /// Path to the database file (`:memory:` for in-memory stores)
    db_path: PathBuf,
}

impl LibsqlStore {
    /// Open (or create) a database file and initialize the schema
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the parent directory cannot be created, the
    /// connection fails, or schema initialization fails.
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        Self::open(db_path, 5000).await
    }

    /// Open a private in-memory database (tests, tooling)
    pub async fn new_in_memory() -> Result<Self, DatabaseError> {
        Self::open(PathBuf::from(":memory:"), 5000).await
    }

    /// Open the database named by the configuration (in-memory when unset)
    pub async fn from_config(config: &TreeConfig) -> Result<Self, DatabaseError> {
        let path = config
            .database_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(":memory:"));
        Self::open(path, config.busy_timeout_ms).await
    }

    async fn open(db_path: PathBuf, busy_timeout_ms: u64) -> Result<Self, DatabaseError> {
        let in_memory = db_path.as_os_str() == ":memory:";

        if db_path.as_os_str().is_empty() {
            return Err(DatabaseError::invalid_path(db_path, "path is empty"));
        }
        if !in_memory && db_path.is_dir() {
            return Err(DatabaseError::invalid_path(db_path, "path is a directory"));
        }

        if !in_memory {
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| DatabaseError::directory_creation(db_path.clone(), e))?;
                }
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let store = Self {
            _db: db,
            conn,
            db_path,
        };
        store.initialize_schema(in_memory, busy_timeout_ms).await?;

        tracing::debug!("Opened subject store at {:?}", store.db_path);
        Ok(store)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so they go through query() instead of
    /// execute().
    async fn execute_pragma(&self, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(pragma)
            .await
            .map_err(|e| DatabaseError::initialization_failed(pragma, e))?;
        let _ = stmt
            .query(())
            .await
            .map_err(|e| DatabaseError::initialization_failed(pragma, e))?;
        Ok(())
    }

    /// Create tables and indexes (idempotent)
    async fn initialize_schema(
        &self,
        in_memory: bool,
        busy_timeout_ms: u64,
    ) -> Result<(), DatabaseError> {
        if !in_memory {
            self.execute_pragma("PRAGMA journal_mode = WAL").await?;
        }
        self.execute_pragma(&format!("PRAGMA busy_timeout = {}", busy_timeout_ms))
            .await?;

        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS subjects (
                    id TEXT PRIMARY KEY,
                    parent_id TEXT,
                    name TEXT NOT NULL,
                    sort INTEGER NOT NULL DEFAULT 0,
                    lft INTEGER NOT NULL DEFAULT 0,
                    rgt INTEGER NOT NULL DEFAULT 0,
                    properties JSON NOT NULL DEFAULT '{}',
                    modified_at DATETIME DEFAULT CURRENT_TIMESTAMP
                )",
                (),
            )
            .await
            .map_err(|e| DatabaseError::initialization_failed("create subjects table", e))?;

        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS departments (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    root_subject_id TEXT NOT NULL
                )",
                (),
            )
            .await
            .map_err(|e| DatabaseError::initialization_failed("create departments table", e))?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_subjects_parent_sort ON subjects(parent_id, sort)",
            "CREATE INDEX IF NOT EXISTS idx_subjects_bounds ON subjects(lft, rgt)",
            "CREATE INDEX IF NOT EXISTS idx_departments_root ON departments(root_subject_id)",
        ];
        for sql in indexes {
            self.conn
                .execute(sql, ())
                .await
                .map_err(|e| DatabaseError::initialization_failed(sql, e))?;
        }

        Ok(())
    }

    /// Parse timestamp from database - handles both SQLite and RFC3339 formats
    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Ok(naive.and_utc());
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }

        Err(DatabaseError::row_conversion(
            "modified_at",
            format!("Unable to parse timestamp '{}'", s),
        ))
    }

    /// Convert a row selected with `SUBJECT_COLUMNS` into a Subject
    fn row_to_subject(row: &Row) -> Result<Subject, DatabaseError> {
        let id: String = row
            .get(0)
            .map_err(|e| DatabaseError::row_conversion("id", e))?;
        let parent_id: Option<String> = row
            .get(1)
            .map_err(|e| DatabaseError::row_conversion("parent_id", e))?;
        let name: String = row
            .get(2)
            .map_err(|e| DatabaseError::row_conversion("name", e))?;
        let sort: i64 = row
            .get(3)
            .map_err(|e| DatabaseError::row_conversion("sort", e))?;
        let left_bound: i64 = row
            .get(4)
            .map_err(|e| DatabaseError::row_conversion("lft", e))?;
        let right_bound: i64 = row
            .get(5)
            .map_err(|e| DatabaseError::row_conversion("rgt", e))?;
        let properties_json: String = row
            .get(6)
            .map_err(|e| DatabaseError::row_conversion("properties", e))?;
        let modified_at_str: String = row
            .get(7)
            .map_err(|e| DatabaseError::row_conversion("modified_at", e))?;

        let properties: Map<String, Value> = serde_json::from_str(&properties_json)
            .map_err(|e| DatabaseError::row_conversion("properties", e))?;

        Ok(Subject {
            id,
            parent_id,
            name,
            sort,
            left_bound,
            right_bound,
            properties,
            modified_at: Self::parse_timestamp(&modified_at_str)?,
        })
    }

    async fn query_subjects(
        &self,
        sql: &str,
        params: impl IntoParams,
    ) -> Result<Vec<Subject>, DatabaseError> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::sql_execution("Subject query failed", e))?;

        let mut subjects = Vec::new();
        while let Some(row) = rows.next().await? {
            subjects.push(Self::row_to_subject(&row)?);
        }
        Ok(subjects)
    }

    async fn require(&self, id: &str) -> Result<Subject, TreeError> {
        self.find(id).await?.ok_or_else(|| TreeError::not_found(id))
    }

    async fn execute(&self, sql: &str, params: impl IntoParams) -> Result<u64, DatabaseError> {
        self.conn
            .execute(sql, params)
            .await
            .map_err(|e| DatabaseError::sql_execution("Statement failed", e))
    }
}

#[async_trait]
impl SubjectStore for LibsqlStore {
    async fn find(&self, id: &str) -> Result<Option<Subject>, TreeError> {
        let sql = format!("SELECT {} FROM subjects WHERE id = ?", SUBJECT_COLUMNS);
        Ok(self.query_subjects(&sql, [id]).await?.into_iter().next())
    }

    async fn children_of(&self, parent_id: Option<&str>) -> Result<Vec<Subject>, TreeError> {
        let subjects = match parent_id {
            Some(parent_id) => {
                let sql = format!(
                    "SELECT {} FROM subjects WHERE parent_id = ? ORDER BY sort, id",
                    SUBJECT_COLUMNS
                );
                self.query_subjects(&sql, [parent_id]).await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM subjects WHERE parent_id IS NULL ORDER BY sort, id",
                    SUBJECT_COLUMNS
                );
                self.query_subjects(&sql, ()).await?
            }
        };
        Ok(subjects)
    }

    async fn descendants_of(&self, id: &str) -> Result<Vec<Subject>, TreeError> {
        let node = self.require(id).await?;
        let sql = format!(
            "SELECT {} FROM subjects WHERE lft > ? AND rgt < ? ORDER BY lft",
            SUBJECT_COLUMNS
        );
        Ok(self
            .query_subjects(&sql, (node.left_bound, node.right_bound))
            .await?)
    }

    async fn ancestors_of(&self, id: &str) -> Result<Vec<Subject>, TreeError> {
        let node = self.require(id).await?;
        let sql = format!(
            "SELECT {} FROM subjects WHERE lft < ? AND rgt > ? ORDER BY lft",
            SUBJECT_COLUMNS
        );
        Ok(self
            .query_subjects(&sql, (node.left_bound, node.right_bound))
            .await?)
    }

    async fn all_subjects(&self) -> Result<Vec<Subject>, TreeError> {
        let sql = format!("SELECT {} FROM subjects ORDER BY lft, sort", SUBJECT_COLUMNS);
        Ok(self.query_subjects(&sql, ()).await?)
    }

    async fn max_child_sort(&self, parent_id: Option<&str>) -> Result<Option<i64>, TreeError> {
        let mut rows = match parent_id {
            Some(parent_id) => self
                .conn
                .query("SELECT MAX(sort) FROM subjects WHERE parent_id = ?", [parent_id])
                .await,
            None => {
                self.conn
                    .query("SELECT MAX(sort) FROM subjects WHERE parent_id IS NULL", ())
                    .await
            }
        }
        .map_err(|e| DatabaseError::sql_execution("Max sort query failed", e))?;

        match rows.next().await.map_err(DatabaseError::from)? {
            Some(row) => {
                let max: Option<i64> = row
                    .get(0)
                    .map_err(|e| DatabaseError::row_conversion("max(sort)", e))?;
                Ok(max)
            }
            None => Ok(None),
        }
    }

    async fn forest_links(&self) -> Result<Vec<TreeLink>, TreeError> {
        let mut rows = self
            .conn
            .query("SELECT id, parent_id, sort, lft, rgt FROM subjects", ())
            .await
            .map_err(|e| DatabaseError::sql_execution("Link query failed", e))?;

        let mut links = Vec::new();
        while let Some(row) = rows.next().await.map_err(DatabaseError::from)? {
            links.push(TreeLink {
                id: row.get(0).map_err(|e| DatabaseError::row_conversion("id", e))?,
                parent_id: row
                    .get(1)
                    .map_err(|e| DatabaseError::row_conversion("parent_id", e))?,
                sort: row.get(2).map_err(|e| DatabaseError::row_conversion("sort", e))?,
                left_bound: row.get(3).map_err(|e| DatabaseError::row_conversion("lft", e))?,
                right_bound: row.get(4).map_err(|e| DatabaseError::row_conversion("rgt", e))?,
            });
        }
        Ok(links)
    }

    async fn create(&self, subject: NewSubject) -> Result<Subject, TreeError> {
        if let Some(parent_id) = subject.parent_id.as_deref() {
            self.require(parent_id).await?;
        }

        let id = Uuid::new_v4().to_string();
        let properties_json = serde_json::to_string(&subject.attributes.properties)?;

        self.execute(
            "INSERT INTO subjects (id, parent_id, name, sort, properties) VALUES (?, ?, ?, ?, ?)",
            (
                id.as_str(),
                subject.parent_id.as_deref(),
                subject.attributes.name.as_str(),
                subject.sort,
                properties_json.as_str(),
            ),
        )
        .await?;

        tracing::debug!("Created subject {} under {:?}", id, subject.parent_id);
        self.require(&id).await
    }

    async fn update(&self, id: &str, attributes: SubjectAttributes) -> Result<Subject, TreeError> {
        let properties_json = serde_json::to_string(&attributes.properties)?;
        let affected = self
            .execute(
                "UPDATE subjects SET name = ?, properties = ?, modified_at = CURRENT_TIMESTAMP WHERE id = ?",
                (attributes.name.as_str(), properties_json.as_str(), id),
            )
            .await?;
        if affected == 0 {
            return Err(TreeError::not_found(id));
        }
        self.require(id).await
    }

    async fn reparent(&self, id: &str, new_parent_id: Option<&str>) -> Result<(), TreeError> {
        if new_parent_id == Some(id) {
            return Err(TreeError::cycle(vec![id.to_string()]));
        }
        if let Some(parent_id) = new_parent_id {
            self.require(parent_id).await?;
        }

        let affected = self
            .execute(
                "UPDATE subjects SET parent_id = ?, modified_at = CURRENT_TIMESTAMP WHERE id = ?",
                (new_parent_id, id),
            )
            .await?;
        if affected == 0 {
            return Err(TreeError::not_found(id));
        }
        Ok(())
    }

    async fn set_sort(&self, id: &str, sort: i64) -> Result<(), TreeError> {
        let affected = self
            .execute("UPDATE subjects SET sort = ? WHERE id = ?", (sort, id))
            .await?;
        if affected == 0 {
            return Err(TreeError::not_found(id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<DeleteResult, TreeError> {
        self.require(id).await?;

        let links = self.forest_links().await?;
        let subtree = collect_subtree(&links, id);

        let anchors = self.protected_anchors().await?;
        if let Some(anchor) = subtree.iter().find(|candidate| anchors.contains(*candidate)) {
            return Err(TreeError::protected(anchor.clone()));
        }

        // Leaves first so a partially applied delete never leaves orphans
        for subject_id in subtree.iter().rev() {
            self.execute("DELETE FROM subjects WHERE id = ?", [subject_id.as_str()])
                .await?;
        }

        tracing::debug!("Deleted subject {} ({} total)", id, subtree.len());
        Ok(DeleteResult {
            deleted_ids: subtree,
        })
    }

    async fn write_bounds(&self, bounds: &[NodeBounds]) -> Result<(), TreeError> {
        for entry in bounds {
            self.execute(
                "UPDATE subjects SET lft = ?, rgt = ? WHERE id = ?",
                (entry.left_bound, entry.right_bound, entry.id.as_str()),
            )
            .await?;
        }
        Ok(())
    }

    async fn create_department(
        &self,
        name: &str,
        root_subject_id: &str,
    ) -> Result<Department, TreeError> {
        self.require(root_subject_id).await?;

        let department = Department::new(name, root_subject_id);
        self.execute(
            "INSERT INTO departments (id, name, root_subject_id) VALUES (?, ?, ?)",
            (
                department.id.as_str(),
                department.name.as_str(),
                department.root_subject_id.as_str(),
            ),
        )
        .await?;
        Ok(department)
    }

    async fn find_department(&self, id: &str) -> Result<Option<Department>, TreeError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, root_subject_id FROM departments WHERE id = ?",
                [id],
            )
            .await
            .map_err(|e| DatabaseError::sql_execution("Department query failed", e))?;

        match rows.next().await.map_err(DatabaseError::from)? {
            Some(row) => Ok(Some(Department {
                id: row.get(0).map_err(|e| DatabaseError::row_conversion("id", e))?,
                name: row.get(1).map_err(|e| DatabaseError::row_conversion("name", e))?,
                root_subject_id: row
                    .get(2)
                    .map_err(|e| DatabaseError::row_conversion("root_subject_id", e))?,
            })),
            None => Ok(None),
        }
    }

    async fn protected_anchors(&self) -> Result<HashSet<String>, TreeError> {
        let mut rows = self
            .conn
            .query("SELECT DISTINCT root_subject_id FROM departments", ())
            .await
            .map_err(|e| DatabaseError::sql_execution("Anchor query failed", e))?;

        let mut anchors = HashSet::new();
        while let Some(row) = rows.next().await.map_err(DatabaseError::from)? {
            let id: String = row
                .get(0)
                .map_err(|e| DatabaseError::row_conversion("root_subject_id", e))?;
            anchors.insert(id);
        }
        Ok(anchors)
    }

    async fn begin_batch(&self) -> Result<(), TreeError> {
        self.conn
            .execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(|e| DatabaseError::batch(BatchStep::Begin, e))?;
        Ok(())
    }

    async fn commit_batch(&self) -> Result<(), TreeError> {
        self.conn
            .execute("COMMIT", ())
            .await
            .map_err(|e| DatabaseError::batch(BatchStep::Commit, e))?;
        Ok(())
    }

    async fn rollback_batch(&self) -> Result<(), TreeError> {
        self.conn
            .execute("ROLLBACK", ())
            .await
            .map_err(|e| DatabaseError::batch(BatchStep::Rollback, e))?;
        Ok(())
    }
}
