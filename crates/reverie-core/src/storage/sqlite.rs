//! SQLite storage implementation
//!
//! Single-writer, short-critical-section persistence for the whole engine:
//! agents, projects, memories, embeddings, links, tiers, settings, and the
//! curiosity/dissonance/dream-session tables (in sibling modules).
//!
//! Uses separate reader/writer connections behind mutexes so all methods
//! take `&self` and `Storage` is `Send + Sync`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::embeddings::{EMBEDDING_DIMENSIONS, Embedding};
use crate::graph::{LinkKind, MemoryLink};
use crate::memory::{
    Agent, EmbeddedMemory, Impact, Memory, MemoryKind, MemoryTier, Project, Region, TemporalMemory,
};

use super::migrations;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// A record violates a data-model invariant
    #[error("Validation failed: {0}")]
    Validation(String),
    /// A configured memory limit would be exceeded
    #[error("Memory limit exceeded for {scope}: {current} >= {limit}")]
    LimitExceeded {
        scope: String,
        current: usize,
        limit: usize,
    },
    /// Stored timestamp failed to parse
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
    /// Schema migration failed (database restored from backup)
    #[error(transparent)]
    Migration(#[from] migrations::MigrationError),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// LIMITS
// ============================================================================

/// Optional caps on memory creation. Updates never count against limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MemoryLimits {
    pub max_memories_per_agent: Option<usize>,
    pub max_memories_per_project: Option<usize>,
    pub max_memories_per_kind: Option<usize>,
}

// ============================================================================
// HELPERS
// ============================================================================

/// Escape LIKE metacharacters so user queries match literally.
pub fn escape_like_pattern(pattern: &str) -> String {
    pattern
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidTimestamp(value.to_string()))
}

pub(crate) fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

/// Retry a database operation once when SQLite reports the file busy/locked.
fn retry_once<T>(mut op: impl FnMut() -> rusqlite::Result<T>) -> rusqlite::Result<T> {
    match op() {
        Err(rusqlite::Error::SqliteFailure(e, _))
            if matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) =>
        {
            tracing::warn!("database busy, retrying once");
            op()
        }
        other => other,
    }
}

// ============================================================================
// STORAGE
// ============================================================================

/// SQLite-backed persistent storage.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    db_path: PathBuf,
    limits: MemoryLimits,
}

impl Storage {
    /// Open (or create) a store at `db_path`, running pending migrations.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_limits(db_path, MemoryLimits::default())
    }

    /// Open with configured memory limits.
    pub fn open_with_limits(db_path: impl Into<PathBuf>, limits: MemoryLimits) -> Result<Self> {
        let db_path = db_path.into();

        let outcome = migrations::run_migrations(&db_path)?;
        if outcome.to_version > outcome.from_version {
            tracing::info!(
                from = outcome.from_version,
                to = outcome.to_version,
                backup = ?outcome.backup_path,
                "database schema upgraded"
            );
        }

        let writer = Connection::open(&db_path)?;
        Self::configure_connection(&writer)?;
        let reader = Connection::open(&db_path)?;
        Self::configure_connection(&reader)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            db_path,
            limits,
        })
    }

    /// Open the default platform-specific store location.
    pub fn open_default() -> Result<Self> {
        let proj_dirs = directories::ProjectDirs::from("io", "grain", "reverie")
            .ok_or_else(|| StorageError::Init("Could not determine data directory".into()))?;
        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        Self::open(data_dir.join("memories.db"))
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Path of the backing database file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Configured limits.
    pub fn limits(&self) -> MemoryLimits {
        self.limits
    }

    pub(crate) fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))
    }

    pub(crate) fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))
    }

    // ========================================================================
    // AGENTS
    // ========================================================================

    /// Save or update an agent (upsert by id).
    pub fn save_agent(&self, agent: &Agent) -> Result<()> {
        let conn = self.writer()?;
        retry_once(|| {
            conn.execute(
                "INSERT INTO agents (id, name, signing_key, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     signing_key = excluded.signing_key",
                params![
                    agent.id,
                    agent.name,
                    agent.signing_key,
                    agent.created_at.to_rfc3339(),
                ],
            )
        })?;
        Ok(())
    }

    pub fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        let conn = self.reader()?;
        let row = conn
            .query_row(
                "SELECT id, name, signing_key, created_at FROM agents WHERE id = ?1",
                params![agent_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, name, signing_key, created_at)| {
            Ok(Agent {
                id,
                name,
                signing_key,
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .transpose()
    }

    // ========================================================================
    // PROJECTS
    // ========================================================================

    /// Save or update a project.
    ///
    /// Paths are unique: if a row with the same path but a different id
    /// exists, that row is updated in place instead of failing.
    pub fn save_project(&self, project: &Project) -> Result<()> {
        let conn = self.writer()?;

        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM projects WHERE path = ?1 AND id != ?2",
                params![project.path, project.id],
                |row| row.get(0),
            )
            .optional()?;

        if existing.is_some() {
            retry_once(|| {
                conn.execute(
                    "UPDATE projects SET name = ?1 WHERE path = ?2",
                    params![project.name, project.path],
                )
            })?;
        } else {
            retry_once(|| {
                conn.execute(
                    "INSERT INTO projects (id, name, path, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                         name = excluded.name,
                         path = excluded.path",
                    params![
                        project.id,
                        project.name,
                        project.path,
                        project.created_at.to_rfc3339(),
                    ],
                )
            })?;
        }
        Ok(())
    }

    pub fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        self.query_project("SELECT id, name, path, created_at FROM projects WHERE id = ?1", project_id)
    }

    pub fn get_project_by_path(&self, path: &str) -> Result<Option<Project>> {
        self.query_project("SELECT id, name, path, created_at FROM projects WHERE path = ?1", path)
    }

    /// All known projects (used by the N3 scope detector).
    pub fn get_projects(&self) -> Result<Vec<Project>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare("SELECT id, name, path, created_at FROM projects")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut projects = Vec::new();
        for row in rows {
            let (id, name, path, created_at) = row?;
            projects.push(Project {
                id,
                name,
                path,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(projects)
    }

    fn query_project(&self, sql: &str, key: &str) -> Result<Option<Project>> {
        let conn = self.reader()?;
        let row = conn
            .query_row(sql, params![key], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .optional()?;

        row.map(|(id, name, path, created_at)| {
            Ok(Project {
                id,
                name,
                path,
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .transpose()
    }

    // ========================================================================
    // MEMORIES
    // ========================================================================

    fn validate_memory(&self, memory: &Memory) -> Result<()> {
        match memory.region {
            Region::Project if memory.project_id.is_none() => {
                return Err(StorageError::Validation(
                    "PROJECT-region memory requires a project_id".into(),
                ));
            }
            Region::Agent if memory.project_id.is_some() => {
                return Err(StorageError::Validation(
                    "AGENT-region memory must not have a project_id".into(),
                ));
            }
            _ => {}
        }
        if !(0.0..=1.0).contains(&memory.confidence) {
            return Err(StorageError::Validation(format!(
                "confidence {} outside [0, 1]",
                memory.confidence
            )));
        }
        Ok(())
    }

    /// Check creation limits. Only new memories count; updates pass freely.
    fn check_limits(&self, memory: &Memory) -> Result<()> {
        if self.get_memory(&memory.id)?.is_some() {
            return Ok(());
        }

        if let Some(limit) = self.limits.max_memories_per_agent {
            let current = self.count_memories(&memory.agent_id, None)?;
            if current >= limit {
                return Err(StorageError::LimitExceeded {
                    scope: "agent total".into(),
                    current,
                    limit,
                });
            }
        }

        if let (Some(limit), Some(project_id)) = (
            self.limits.max_memories_per_project,
            memory.project_id.as_deref(),
        ) {
            let current = self.count_memories(&memory.agent_id, Some(project_id))?;
            if current >= limit {
                return Err(StorageError::LimitExceeded {
                    scope: format!("project '{project_id}'"),
                    current,
                    limit,
                });
            }
        }

        if let Some(limit) = self.limits.max_memories_per_kind {
            let current = self.count_memories_by_kind(
                &memory.agent_id,
                memory.kind,
                memory.project_id.as_deref(),
            )?;
            if current >= limit {
                return Err(StorageError::LimitExceeded {
                    scope: format!("kind '{}'", memory.kind),
                    current,
                    limit,
                });
            }
        }

        Ok(())
    }

    /// Save or update a memory.
    ///
    /// On conflict only the mutable fields are written back; region, kind,
    /// impact, original_content, and creation context stay as first saved.
    pub fn save_memory(&self, memory: &Memory) -> Result<()> {
        self.validate_memory(memory)?;
        self.check_limits(memory)?;

        let conn = self.writer()?;
        retry_once(|| {
            conn.execute(
                "INSERT INTO memories (
                    id, agent_id, region, project_id, kind,
                    content, original_content, impact, confidence,
                    created_at, last_accessed, previous_memory_id,
                    version, superseded_by, signature, token_count, platform,
                    session_id, git_commit, git_branch, tier
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                        ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
                ON CONFLICT(id) DO UPDATE SET
                    content = excluded.content,
                    confidence = excluded.confidence,
                    last_accessed = excluded.last_accessed,
                    version = excluded.version,
                    superseded_by = excluded.superseded_by,
                    signature = excluded.signature,
                    token_count = excluded.token_count,
                    platform = excluded.platform,
                    session_id = excluded.session_id,
                    git_commit = excluded.git_commit,
                    git_branch = excluded.git_branch",
                params![
                    memory.id,
                    memory.agent_id,
                    memory.region.as_str(),
                    memory.project_id,
                    memory.kind.as_str(),
                    memory.content,
                    memory.original_content,
                    memory.impact.as_str(),
                    memory.confidence,
                    memory.created_at.to_rfc3339(),
                    memory.last_accessed.to_rfc3339(),
                    memory.previous_memory_id,
                    memory.version,
                    memory.superseded_by,
                    memory.signature,
                    memory.token_count,
                    memory.platform,
                    memory.session_id,
                    memory.git_commit,
                    memory.git_branch,
                    memory.tier.as_str(),
                ],
            )
        })?;
        Ok(())
    }

    pub fn get_memory(&self, memory_id: &str) -> Result<Option<Memory>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare("SELECT * FROM memories WHERE id = ?1")?;
        let mut rows = stmt.query(params![memory_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_memory(row)?)),
            None => Ok(None),
        }
    }

    /// Get memories for an agent with optional filters, newest first.
    ///
    /// A `project_id` filter also includes AGENT-region (cross-project)
    /// memories; pass a `region` to narrow further.
    pub fn get_memories_for_agent(
        &self,
        agent_id: &str,
        region: Option<Region>,
        project_id: Option<&str>,
        kind: Option<MemoryKind>,
        include_superseded: bool,
        limit: Option<usize>,
    ) -> Result<Vec<Memory>> {
        let mut sql = String::from("SELECT * FROM memories WHERE agent_id = ?");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(agent_id.to_string())];

        if let Some(region) = region {
            sql.push_str(" AND region = ?");
            args.push(Box::new(region.as_str()));
        }
        if let Some(project_id) = project_id {
            sql.push_str(" AND (project_id = ? OR region = 'AGENT')");
            args.push(Box::new(project_id.to_string()));
        }
        if let Some(kind) = kind {
            sql.push_str(" AND kind = ?");
            args.push(Box::new(kind.as_str()));
        }
        if !include_superseded {
            sql.push_str(" AND superseded_by IS NULL");
        }
        sql.push_str(" ORDER BY created_at DESC");
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            args.push(Box::new(limit as i64));
        }

        self.query_memories(&sql, &args)
    }

    /// Most recent non-superseded memory of a kind, used to wire the
    /// previous-memory chain for new memories.
    pub fn get_latest_memory_of_kind(
        &self,
        agent_id: &str,
        kind: MemoryKind,
        region: Region,
        project_id: Option<&str>,
    ) -> Result<Option<Memory>> {
        let mut sql = String::from(
            "SELECT * FROM memories
             WHERE agent_id = ? AND kind = ? AND region = ?
             AND superseded_by IS NULL",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(agent_id.to_string()),
            Box::new(kind.as_str()),
            Box::new(region.as_str()),
        ];
        if let Some(project_id) = project_id {
            sql.push_str(" AND project_id = ?");
            args.push(Box::new(project_id.to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT 1");

        Ok(self.query_memories(&sql, &args)?.into_iter().next())
    }

    /// Atomically mark `old_memory_id` as superseded by `new_memory_id`.
    pub fn supersede_memory(&self, old_memory_id: &str, new_memory_id: &str) -> Result<()> {
        let conn = self.writer()?;
        retry_once(|| {
            conn.execute(
                "UPDATE memories SET superseded_by = ?1 WHERE id = ?2",
                params![new_memory_id, old_memory_id],
            )
        })?;
        Ok(())
    }

    /// Re-level a memory's impact. An explicit operation (like re-tiering)
    /// rather than part of the upsert, which never touches impact.
    pub fn update_impact(&self, memory_id: &str, impact: Impact) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "UPDATE memories SET impact = ?1 WHERE id = ?2",
            params![impact.as_str(), memory_id],
        )?;
        Ok(())
    }

    pub fn update_confidence(&self, memory_id: &str, confidence: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(StorageError::Validation(format!(
                "confidence {confidence} outside [0, 1]"
            )));
        }
        let conn = self.writer()?;
        conn.execute(
            "UPDATE memories SET confidence = ?1 WHERE id = ?2",
            params![confidence, memory_id],
        )?;
        Ok(())
    }

    /// Delete a memory. Prefer superseding; links are left behind and become
    /// detectable as orphans by the integrity checker.
    pub fn delete_memory(&self, memory_id: &str) -> Result<()> {
        let conn = self.writer()?;
        conn.execute("DELETE FROM memories WHERE id = ?1", params![memory_id])?;
        Ok(())
    }

    /// Substring search over content and original_content. LIKE
    /// metacharacters in the query match literally.
    pub fn search_memories(
        &self,
        agent_id: &str,
        query: &str,
        project_id: Option<&str>,
        limit: usize,
        include_superseded: bool,
    ) -> Result<Vec<Memory>> {
        let escaped = escape_like_pattern(query);
        let pattern = format!("%{escaped}%");

        let mut sql = String::from(
            "SELECT * FROM memories
             WHERE agent_id = ?
             AND (content LIKE ? ESCAPE '\\' OR original_content LIKE ? ESCAPE '\\')",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(agent_id.to_string()),
            Box::new(pattern.clone()),
            Box::new(pattern),
        ];
        if !include_superseded {
            sql.push_str(" AND superseded_by IS NULL");
        }
        if let Some(project_id) = project_id {
            sql.push_str(" AND (project_id = ? OR region = 'AGENT')");
            args.push(Box::new(project_id.to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ?");
        args.push(Box::new(limit as i64));

        self.query_memories(&sql, &args)
    }

    pub fn count_memories(&self, agent_id: &str, project_id: Option<&str>) -> Result<usize> {
        let mut sql = String::from(
            "SELECT COUNT(*) FROM memories WHERE agent_id = ? AND superseded_by IS NULL",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(agent_id.to_string())];
        if let Some(project_id) = project_id {
            sql.push_str(" AND (project_id = ? OR region = 'AGENT')");
            args.push(Box::new(project_id.to_string()));
        }

        let conn = self.reader()?;
        let count: i64 = conn.query_row(
            &sql,
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn count_memories_by_kind(
        &self,
        agent_id: &str,
        kind: MemoryKind,
        project_id: Option<&str>,
    ) -> Result<usize> {
        let mut sql = String::from(
            "SELECT COUNT(*) FROM memories
             WHERE agent_id = ? AND kind = ? AND superseded_by IS NULL",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(agent_id.to_string()), Box::new(kind.as_str())];
        if let Some(project_id) = project_id {
            sql.push_str(" AND (project_id = ? OR region = 'AGENT')");
            args.push(Box::new(project_id.to_string()));
        }

        let conn = self.reader()?;
        let count: i64 = conn.query_row(
            &sql,
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ========================================================================
    // SESSION / GIT QUERIES
    // ========================================================================

    /// All memories from a session, in creation order.
    pub fn get_memories_by_session(
        &self,
        session_id: &str,
        agent_id: Option<&str>,
        project_id: Option<&str>,
    ) -> Result<Vec<Memory>> {
        let mut sql = String::from("SELECT * FROM memories WHERE session_id = ?");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(session_id.to_string())];
        if let Some(agent_id) = agent_id {
            sql.push_str(" AND agent_id = ?");
            args.push(Box::new(agent_id.to_string()));
        }
        if let Some(project_id) = project_id {
            sql.push_str(" AND project_id = ?");
            args.push(Box::new(project_id.to_string()));
        }
        sql.push_str(" ORDER BY created_at ASC");

        self.query_memories(&sql, &args)
    }

    /// Most recent distinct session ids, newest first.
    pub fn get_distinct_sessions(
        &self,
        agent_id: Option<&str>,
        project_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let mut sql =
            String::from("SELECT DISTINCT session_id FROM memories WHERE session_id IS NOT NULL");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(agent_id) = agent_id {
            sql.push_str(" AND agent_id = ?");
            args.push(Box::new(agent_id.to_string()));
        }
        if let Some(project_id) = project_id {
            sql.push_str(" AND project_id = ?");
            args.push(Box::new(project_id.to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ?");
        args.push(Box::new(limit as i64));

        let conn = self.reader()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            |row| row.get::<_, String>(0),
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Memories recorded against a commit; prefix match on the hash.
    pub fn get_memories_by_git_commit(
        &self,
        commit: &str,
        agent_id: Option<&str>,
        project_id: Option<&str>,
    ) -> Result<Vec<Memory>> {
        let pattern = format!("{}%", escape_like_pattern(commit));
        let mut sql = String::from("SELECT * FROM memories WHERE git_commit LIKE ? ESCAPE '\\'");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(pattern)];
        if let Some(agent_id) = agent_id {
            sql.push_str(" AND agent_id = ?");
            args.push(Box::new(agent_id.to_string()));
        }
        if let Some(project_id) = project_id {
            sql.push_str(" AND project_id = ?");
            args.push(Box::new(project_id.to_string()));
        }
        sql.push_str(" ORDER BY created_at ASC");

        self.query_memories(&sql, &args)
    }

    /// Memories created on a branch (exact match), newest first.
    pub fn get_memories_by_git_branch(
        &self,
        branch: &str,
        agent_id: Option<&str>,
        project_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let mut sql = String::from("SELECT * FROM memories WHERE git_branch = ?");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(branch.to_string())];
        if let Some(agent_id) = agent_id {
            sql.push_str(" AND agent_id = ?");
            args.push(Box::new(agent_id.to_string()));
        }
        if let Some(project_id) = project_id {
            sql.push_str(" AND project_id = ?");
            args.push(Box::new(project_id.to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ?");
        args.push(Box::new(limit as i64));

        self.query_memories(&sql, &args)
    }

    /// Non-superseded memories at an impact level, newest first.
    pub fn get_memories_by_impact(
        &self,
        agent_id: &str,
        impact: Impact,
        project_id: Option<&str>,
    ) -> Result<Vec<Memory>> {
        let mut sql = String::from(
            "SELECT * FROM memories
             WHERE agent_id = ? AND impact = ? AND superseded_by IS NULL",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(agent_id.to_string()), Box::new(impact.as_str())];
        if let Some(project_id) = project_id {
            sql.push_str(" AND (project_id = ? OR region = 'AGENT')");
            args.push(Box::new(project_id.to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC");

        self.query_memories(&sql, &args)
    }

    // ========================================================================
    // TIERS
    // ========================================================================

    pub fn update_tier(&self, memory_id: &str, tier: MemoryTier) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "UPDATE memories SET tier = ?1 WHERE id = ?2",
            params![tier.as_str(), memory_id],
        )?;
        Ok(())
    }

    /// Non-superseded memories in the given tiers, newest first.
    pub fn get_memories_by_tier(
        &self,
        agent_id: &str,
        tiers: &[MemoryTier],
        region: Option<Region>,
        project_id: Option<&str>,
    ) -> Result<Vec<Memory>> {
        if tiers.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; tiers.len()].join(",");
        let mut sql = format!(
            "SELECT * FROM memories
             WHERE agent_id = ? AND tier IN ({placeholders})
             AND superseded_by IS NULL"
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(agent_id.to_string())];
        for tier in tiers {
            args.push(Box::new(tier.as_str()));
        }
        if let Some(region) = region {
            sql.push_str(" AND region = ?");
            args.push(Box::new(region.as_str()));
        }
        if let Some(project_id) = project_id {
            sql.push_str(" AND (project_id = ? OR region = 'AGENT')");
            args.push(Box::new(project_id.to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC");

        self.query_memories(&sql, &args)
    }

    // ========================================================================
    // EMBEDDINGS
    // ========================================================================

    /// Save a memory's embedding. The vector must be exactly
    /// [`EMBEDDING_DIMENSIONS`] long.
    pub fn save_embedding(&self, memory_id: &str, embedding: &[f32]) -> Result<()> {
        if embedding.len() != EMBEDDING_DIMENSIONS {
            return Err(StorageError::Validation(format!(
                "embedding dimension {} != {}",
                embedding.len(),
                EMBEDDING_DIMENSIONS
            )));
        }
        let blob = Embedding::new(embedding.to_vec()).to_bytes();
        let conn = self.writer()?;
        let updated = retry_once(|| {
            conn.execute(
                "UPDATE memories SET embedding = ?1 WHERE id = ?2",
                params![blob, memory_id],
            )
        })?;
        if updated == 0 {
            return Err(StorageError::NotFound(memory_id.to_string()));
        }
        Ok(())
    }

    pub fn get_embedding(&self, memory_id: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.reader()?;
        let blob: Option<Option<Vec<u8>>> = conn
            .query_row(
                "SELECT embedding FROM memories WHERE id = ?1",
                params![memory_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(blob
            .flatten()
            .and_then(|bytes| Embedding::from_bytes(&bytes))
            .map(|e| e.vector))
    }

    /// All memories with embeddings, for semantic search.
    pub fn get_memories_with_embeddings(
        &self,
        agent_id: &str,
        project_id: Option<&str>,
        region: Option<Region>,
        include_superseded: bool,
    ) -> Result<Vec<EmbeddedMemory>> {
        let mut sql = String::from(
            "SELECT id, content, embedding FROM memories
             WHERE agent_id = ? AND embedding IS NOT NULL",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(agent_id.to_string())];
        if let Some(region) = region {
            sql.push_str(" AND region = ?");
            args.push(Box::new(region.as_str()));
        }
        if let Some(project_id) = project_id {
            sql.push_str(" AND (project_id = ? OR region = 'AGENT')");
            args.push(Box::new(project_id.to_string()));
        }
        if !include_superseded {
            sql.push_str(" AND superseded_by IS NULL");
        }

        let conn = self.reader()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            },
        )?;

        let mut result = Vec::new();
        for row in rows {
            let (id, content, blob) = row?;
            if let Some(embedding) = Embedding::from_bytes(&blob) {
                result.push(EmbeddedMemory {
                    id,
                    content,
                    embedding: embedding.vector,
                });
            }
        }
        Ok(result)
    }

    /// Memories with embeddings plus creation time and session id, for
    /// BUILDS_ON detection. Newest first.
    pub fn get_memories_with_temporal_context(
        &self,
        agent_id: &str,
        project_id: Option<&str>,
        include_superseded: bool,
    ) -> Result<Vec<TemporalMemory>> {
        let mut sql = String::from(
            "SELECT id, content, embedding, created_at, session_id FROM memories
             WHERE agent_id = ? AND embedding IS NOT NULL",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(agent_id.to_string())];
        if let Some(project_id) = project_id {
            sql.push_str(" AND (project_id = ? OR region = 'AGENT')");
            args.push(Box::new(project_id.to_string()));
        }
        if !include_superseded {
            sql.push_str(" AND superseded_by IS NULL");
        }
        sql.push_str(" ORDER BY created_at DESC");

        let conn = self.reader()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            },
        )?;

        let mut result = Vec::new();
        for row in rows {
            let (id, content, blob, created_at, session_id) = row?;
            let Some(embedding) = Embedding::from_bytes(&blob) else {
                continue;
            };
            result.push(TemporalMemory {
                id,
                content,
                embedding: embedding.vector,
                created_at: parse_timestamp(&created_at)?,
                session_id,
            });
        }
        Ok(result)
    }

    /// Memories still waiting for an embedding, as (id, content) pairs.
    pub fn get_memories_without_embeddings(
        &self,
        agent_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<(String, String)>> {
        let mut sql = String::from(
            "SELECT id, content FROM memories
             WHERE agent_id = ? AND embedding IS NULL AND superseded_by IS NULL",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(agent_id.to_string())];
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            args.push(Box::new(limit as i64));
        }

        let conn = self.reader()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ========================================================================
    // SCOPE VALIDATION BOOKKEEPING
    // ========================================================================

    /// Mark a memory as having passed N3 scope validation.
    pub fn mark_memory_validated(&self, memory_id: &str) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "UPDATE memories SET scope_validated = 1 WHERE id = ?1",
            params![memory_id],
        )?;
        Ok(())
    }

    /// Non-superseded memories not yet scope-validated.
    pub fn get_unvalidated_memories(&self, agent_id: &str, limit: usize) -> Result<Vec<Memory>> {
        let sql = "SELECT * FROM memories
                   WHERE agent_id = ? AND scope_validated = 0 AND superseded_by IS NULL
                   ORDER BY created_at DESC LIMIT ?";
        let args: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(agent_id.to_string()), Box::new(limit as i64)];
        self.query_memories(sql, &args)
    }

    // ========================================================================
    // LINKS
    // ========================================================================

    /// Save a link. Idempotent by ordered (source, target); re-saving
    /// overwrites kind and similarity.
    pub fn save_link(
        &self,
        source_id: &str,
        target_id: &str,
        kind: LinkKind,
        similarity: Option<f32>,
    ) -> Result<()> {
        let conn = self.writer()?;
        retry_once(|| {
            conn.execute(
                "INSERT INTO memory_links (source_id, target_id, link_type, similarity, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(source_id, target_id) DO UPDATE SET
                     link_type = excluded.link_type,
                     similarity = excluded.similarity",
                params![
                    source_id,
                    target_id,
                    kind.as_str(),
                    similarity,
                    Utc::now().to_rfc3339(),
                ],
            )
        })?;
        Ok(())
    }

    /// All links touching a memory, as source or target.
    pub fn get_links_for_memory(&self, memory_id: &str) -> Result<Vec<MemoryLink>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT source_id, target_id, link_type, similarity, created_at
             FROM memory_links
             WHERE source_id = ?1 OR target_id = ?1",
        )?;
        let rows = stmt.query_map(params![memory_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<f32>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut links = Vec::new();
        for row in rows {
            let (source_id, target_id, link_type, similarity, created_at) = row?;
            let kind = LinkKind::parse_name(&link_type).ok_or_else(|| {
                StorageError::Validation(format!("unknown link type '{link_type}'"))
            })?;
            links.push(MemoryLink {
                source_id,
                target_id,
                kind,
                similarity,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(links)
    }

    /// Ids of memories linked to a memory (either direction), optionally
    /// filtered by link kind.
    pub fn get_linked_memory_ids(
        &self,
        memory_id: &str,
        kind: Option<LinkKind>,
    ) -> Result<Vec<String>> {
        let mut sql = String::from(
            "SELECT CASE WHEN source_id = ?1 THEN target_id ELSE source_id END AS linked_id
             FROM memory_links
             WHERE (source_id = ?1 OR target_id = ?1)",
        );
        if kind.is_some() {
            sql.push_str(" AND link_type = ?2");
        }

        let conn = self.reader()?;
        let mut stmt = conn.prepare(&sql)?;
        let ids = match kind {
            Some(kind) => {
                let rows = stmt.query_map(params![memory_id, kind.as_str()], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<Vec<String>>>()?
            }
            None => {
                let rows = stmt.query_map(params![memory_id], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<Vec<String>>>()?
            }
        };
        Ok(ids)
    }

    pub fn delete_links_for_memory(&self, memory_id: &str) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "DELETE FROM memory_links WHERE source_id = ?1 OR target_id = ?1",
            params![memory_id],
        )?;
        Ok(())
    }

    /// The set of ordered (source, target) pairs among the given ids.
    pub fn get_existing_link_pairs(
        &self,
        memory_ids: &[String],
    ) -> Result<HashSet<(String, String)>> {
        let mut pairs = HashSet::new();
        for id in memory_ids {
            for link in self.get_links_for_memory(id)? {
                pairs.insert((link.source_id, link.target_id));
            }
        }
        Ok(pairs)
    }

    // ========================================================================
    // SETTINGS
    // ========================================================================

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.reader()?;
        Ok(conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.writer()?;
        retry_once(|| {
            conn.execute(
                "INSERT INTO settings (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
        })?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> Result<()> {
        let conn = self.writer()?;
        conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(())
    }

    // ========================================================================
    // INTERNAL
    // ========================================================================

    fn query_memories(
        &self,
        sql: &str,
        args: &[Box<dyn rusqlite::ToSql>],
    ) -> Result<Vec<Memory>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())))?;

        let mut memories = Vec::new();
        while let Some(row) = rows.next()? {
            memories.push(row_to_memory(row)?);
        }
        Ok(memories)
    }
}

/// Convert a `SELECT * FROM memories` row into a [`Memory`].
fn row_to_memory(row: &rusqlite::Row<'_>) -> Result<Memory> {
    let region_str: String = row.get("region")?;
    let kind_str: String = row.get("kind")?;
    let impact_str: String = row.get("impact")?;
    let tier_str: String = row.get("tier")?;
    let created_at: String = row.get("created_at")?;
    let last_accessed: String = row.get("last_accessed")?;

    Ok(Memory {
        id: row.get("id")?,
        agent_id: row.get("agent_id")?,
        region: Region::parse_name(&region_str)
            .ok_or_else(|| StorageError::Validation(format!("unknown region '{region_str}'")))?,
        project_id: row.get("project_id")?,
        kind: MemoryKind::parse_name(&kind_str)
            .ok_or_else(|| StorageError::Validation(format!("unknown kind '{kind_str}'")))?,
        content: row.get("content")?,
        original_content: row.get("original_content")?,
        impact: Impact::parse_name(&impact_str)
            .ok_or_else(|| StorageError::Validation(format!("unknown impact '{impact_str}'")))?,
        confidence: row.get("confidence")?,
        created_at: parse_timestamp(&created_at)?,
        last_accessed: parse_timestamp(&last_accessed)?,
        previous_memory_id: row.get("previous_memory_id")?,
        version: row.get("version")?,
        superseded_by: row.get("superseded_by")?,
        signature: row.get("signature")?,
        token_count: row.get("token_count")?,
        platform: row.get("platform")?,
        session_id: row.get("session_id")?,
        git_commit: row.get("git_commit")?,
        git_branch: row.get("git_branch")?,
        tier: MemoryTier::parse_name(&tier_str)
            .ok_or_else(|| StorageError::Validation(format!("unknown tier '{tier_str}'")))?,
        signature_valid: None,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::open(dir.path().join("memories.db")).unwrap();
        (dir, store)
    }

    fn seeded_agent(store: &Storage) -> Agent {
        let agent = Agent::new("agent-1", "Reverie");
        store.save_agent(&agent).unwrap();
        agent
    }

    fn seeded_project(store: &Storage) -> Project {
        let project = Project::new("proj-1", "crm", "/home/dev/crm");
        store.save_project(&project).unwrap();
        project
    }

    fn sample_memory(agent_id: &str) -> Memory {
        Memory::new(
            agent_id,
            Region::Agent,
            None,
            MemoryKind::Learnings,
            "Prefer explicit error types over panics.",
            Impact::Medium,
        )
    }

    #[test]
    fn test_memory_roundtrip_all_fields() {
        let (_dir, store) = test_store();
        let agent = seeded_agent(&store);

        let mut memory = sample_memory(&agent.id);
        memory.confidence = 0.85;
        memory.token_count = Some(42);
        memory.platform = Some("claude".into());
        memory.session_id = Some("20260130-150423-a1b2c3d4".into());
        memory.git_commit = Some("abc12345".into());
        memory.git_branch = Some("main".into());
        store.save_memory(&memory).unwrap();

        let loaded = store.get_memory(&memory.id).unwrap().unwrap();
        assert_eq!(loaded.content, memory.content);
        assert_eq!(loaded.confidence, memory.confidence);
        assert_eq!(loaded.token_count, memory.token_count);
        assert_eq!(loaded.session_id, memory.session_id);
        assert_eq!(loaded.git_commit, memory.git_commit);
        assert_eq!(loaded.created_at, memory.created_at);
        assert_eq!(loaded.tier, memory.tier);
    }

    #[test]
    fn test_region_invariant_enforced() {
        let (_dir, store) = test_store();
        let agent = seeded_agent(&store);

        let mut memory = sample_memory(&agent.id);
        memory.region = Region::Project; // project_id still None
        let err = store.save_memory(&memory).unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));

        let mut memory = sample_memory(&agent.id);
        memory.project_id = Some("proj-1".into()); // region still AGENT
        let err = store.save_memory(&memory).unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }

    #[test]
    fn test_confidence_range_enforced() {
        let (_dir, store) = test_store();
        let agent = seeded_agent(&store);
        let mut memory = sample_memory(&agent.id);
        memory.confidence = 1.5;
        assert!(matches!(
            store.save_memory(&memory),
            Err(StorageError::Validation(_))
        ));
    }

    #[test]
    fn test_project_path_reconciliation() {
        let (_dir, store) = test_store();
        let project = seeded_project(&store);

        // Different id, same path: updates the existing row instead
        let duplicate = Project::new("proj-2", "crm-renamed", &project.path);
        store.save_project(&duplicate).unwrap();

        let by_path = store.get_project_by_path(&project.path).unwrap().unwrap();
        assert_eq!(by_path.id, project.id);
        assert_eq!(by_path.name, "crm-renamed");
        assert!(store.get_project("proj-2").unwrap().is_none());
    }

    #[test]
    fn test_limit_exceeded_names_scope() {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::open_with_limits(
            dir.path().join("memories.db"),
            MemoryLimits {
                max_memories_per_agent: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
        let agent = seeded_agent(&store);

        store.save_memory(&sample_memory(&agent.id)).unwrap();
        let err = store.save_memory(&sample_memory(&agent.id)).unwrap_err();
        match err {
            StorageError::LimitExceeded { scope, current, limit } => {
                assert_eq!(scope, "agent total");
                assert_eq!((current, limit), (1, 1));
            }
            other => panic!("expected LimitExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_updates_do_not_count_against_limits() {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::open_with_limits(
            dir.path().join("memories.db"),
            MemoryLimits {
                max_memories_per_agent: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
        let agent = seeded_agent(&store);

        let mut memory = sample_memory(&agent.id);
        store.save_memory(&memory).unwrap();
        memory.content = "updated".into();
        store.save_memory(&memory).unwrap();
    }

    #[test]
    fn test_search_escapes_like_metacharacters() {
        let (_dir, store) = test_store();
        let agent = seeded_agent(&store);

        let mut with_percent = sample_memory(&agent.id);
        with_percent.content = "Coverage is 100% now".into();
        store.save_memory(&with_percent).unwrap();

        let mut plain = sample_memory(&agent.id);
        plain.content = "Coverage is 100 percent now".into();
        store.save_memory(&plain).unwrap();

        let hits = store
            .search_memories(&agent.id, "100%", None, 10, false)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, with_percent.id);
    }

    #[test]
    fn test_search_excludes_superseded_by_default() {
        let (_dir, store) = test_store();
        let agent = seeded_agent(&store);

        let old = sample_memory(&agent.id);
        store.save_memory(&old).unwrap();
        let new = sample_memory(&agent.id);
        store.save_memory(&new).unwrap();
        store.supersede_memory(&old.id, &new.id).unwrap();

        let hits = store
            .search_memories(&agent.id, "explicit error", None, 10, false)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, new.id);

        let all = store
            .search_memories(&agent.id, "explicit error", None, 10, true)
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_link_uniqueness_and_bidirectional_lookup() {
        let (_dir, store) = test_store();
        let agent = seeded_agent(&store);
        let a = sample_memory(&agent.id);
        let b = sample_memory(&agent.id);
        store.save_memory(&a).unwrap();
        store.save_memory(&b).unwrap();

        store
            .save_link(&a.id, &b.id, LinkKind::RelatesTo, Some(0.6))
            .unwrap();
        store
            .save_link(&a.id, &b.id, LinkKind::BuildsOn, Some(0.8))
            .unwrap();

        let links = store.get_links_for_memory(&a.id).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].kind, LinkKind::BuildsOn);
        assert_eq!(links[0].similarity, Some(0.8));

        assert_eq!(store.get_linked_memory_ids(&a.id, None).unwrap(), vec![b.id.clone()]);
        assert_eq!(store.get_linked_memory_ids(&b.id, None).unwrap(), vec![a.id.clone()]);
    }

    #[test]
    fn test_linked_ids_kind_filter() {
        let (_dir, store) = test_store();
        let agent = seeded_agent(&store);
        let a = sample_memory(&agent.id);
        let b = sample_memory(&agent.id);
        let c = sample_memory(&agent.id);
        for m in [&a, &b, &c] {
            store.save_memory(m).unwrap();
        }
        store.save_link(&a.id, &b.id, LinkKind::BuildsOn, None).unwrap();
        store.save_link(&a.id, &c.id, LinkKind::RelatesTo, None).unwrap();

        let builds_on = store
            .get_linked_memory_ids(&a.id, Some(LinkKind::BuildsOn))
            .unwrap();
        assert_eq!(builds_on, vec![b.id]);
    }

    #[test]
    fn test_embedding_roundtrip_bit_exact() {
        let (_dir, store) = test_store();
        let agent = seeded_agent(&store);
        let memory = sample_memory(&agent.id);
        store.save_memory(&memory).unwrap();

        let mut vector = vec![0.0_f32; EMBEDDING_DIMENSIONS];
        vector[0] = 0.25;
        vector[383] = -1.5;
        store.save_embedding(&memory.id, &vector).unwrap();

        let loaded = store.get_embedding(&memory.id).unwrap().unwrap();
        assert_eq!(loaded, vector);
    }

    #[test]
    fn test_embedding_dimension_mismatch_rejected() {
        let (_dir, store) = test_store();
        let agent = seeded_agent(&store);
        let memory = sample_memory(&agent.id);
        store.save_memory(&memory).unwrap();

        assert!(matches!(
            store.save_embedding(&memory.id, &[1.0, 2.0]),
            Err(StorageError::Validation(_))
        ));
    }

    #[test]
    fn test_git_commit_prefix_match() {
        let (_dir, store) = test_store();
        let agent = seeded_agent(&store);

        let mut memory = sample_memory(&agent.id);
        memory.git_commit = Some("abc123def456".into());
        store.save_memory(&memory).unwrap();

        let hits = store.get_memories_by_git_commit("abc123", None, None).unwrap();
        assert_eq!(hits.len(), 1);
        let misses = store.get_memories_by_git_commit("def456", None, None).unwrap();
        assert!(misses.is_empty());
    }

    #[test]
    fn test_distinct_sessions_newest_first() {
        let (_dir, store) = test_store();
        let agent = seeded_agent(&store);

        for (i, session) in ["s-old", "s-old", "s-new"].iter().enumerate() {
            let mut memory = sample_memory(&agent.id);
            memory.session_id = Some((*session).to_string());
            memory.created_at = Utc::now() + chrono::Duration::seconds(i as i64);
            store.save_memory(&memory).unwrap();
        }

        let sessions = store.get_distinct_sessions(Some(&agent.id), None, 10).unwrap();
        assert_eq!(sessions, vec!["s-new".to_string(), "s-old".to_string()]);
    }

    #[test]
    fn test_latest_memory_of_kind_skips_superseded() {
        let (_dir, store) = test_store();
        let agent = seeded_agent(&store);

        let mut first = sample_memory(&agent.id);
        first.created_at = Utc::now() - chrono::Duration::hours(2);
        store.save_memory(&first).unwrap();

        let mut second = sample_memory(&agent.id);
        second.created_at = Utc::now() - chrono::Duration::hours(1);
        store.save_memory(&second).unwrap();
        store.supersede_memory(&second.id, &first.id).unwrap();

        let latest = store
            .get_latest_memory_of_kind(&agent.id, MemoryKind::Learnings, Region::Agent, None)
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, first.id);
    }

    #[test]
    fn test_unvalidated_memories_flow() {
        let (_dir, store) = test_store();
        let agent = seeded_agent(&store);
        let memory = sample_memory(&agent.id);
        store.save_memory(&memory).unwrap();

        let unvalidated = store.get_unvalidated_memories(&agent.id, 10).unwrap();
        assert_eq!(unvalidated.len(), 1);

        store.mark_memory_validated(&memory.id).unwrap();
        assert!(store.get_unvalidated_memories(&agent.id, 10).unwrap().is_empty());
    }

    #[test]
    fn test_settings_roundtrip() {
        let (_dir, store) = test_store();
        assert_eq!(store.get_setting("current_session_id").unwrap(), None);
        store.set_setting("current_session_id", "s-1").unwrap();
        store.set_setting("current_session_id", "s-2").unwrap();
        assert_eq!(
            store.get_setting("current_session_id").unwrap(),
            Some("s-2".into())
        );
        store.delete_setting("current_session_id").unwrap();
        assert_eq!(store.get_setting("current_session_id").unwrap(), None);
    }

    #[test]
    fn test_memories_by_tier_region_filter() {
        let (_dir, store) = test_store();
        let agent = seeded_agent(&store);
        let project = seeded_project(&store);

        let mut agent_mem = sample_memory(&agent.id);
        agent_mem.tier = MemoryTier::Core;
        store.save_memory(&agent_mem).unwrap();
        store.update_tier(&agent_mem.id, MemoryTier::Core).unwrap();

        let mut project_mem = Memory::new(
            &agent.id,
            Region::Project,
            Some(project.id.clone()),
            MemoryKind::Architectural,
            "Always run the schema linter.",
            Impact::High,
        );
        project_mem.tier = MemoryTier::Core;
        store.save_memory(&project_mem).unwrap();

        let agent_only = store
            .get_memories_by_tier(&agent.id, &[MemoryTier::Core], Some(Region::Agent), None)
            .unwrap();
        assert_eq!(agent_only.len(), 1);
        assert_eq!(agent_only[0].id, agent_mem.id);
    }
}
