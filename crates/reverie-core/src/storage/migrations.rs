//! Database migrations
//!
//! Versioned, one-step-forward schema upgrades. Fresh databases receive the
//! full schema directly; existing databases are backed up to a timestamped
//! copy before any pending migration runs, and restored from that copy if a
//! step fails.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::Connection;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 3;

/// A database migration.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version this migration upgrades to
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// Migration definitions, one forward step each.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: agents, projects, memories, memory_links, settings",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Curiosity and dissonance queues",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Dream session FSM persistence and scope validation flag",
        up: MIGRATION_V3_UP,
    },
];

/// V1: core schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    signing_key TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    path TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    region TEXT NOT NULL CHECK (region IN ('AGENT', 'PROJECT')),
    project_id TEXT,
    kind TEXT NOT NULL CHECK (kind IN (
        'EMOTIONAL', 'ARCHITECTURAL', 'LEARNINGS', 'ACHIEVEMENTS', 'INTROSPECT', 'DREAM'
    )),
    content TEXT NOT NULL,
    original_content TEXT NOT NULL,
    impact TEXT NOT NULL CHECK (impact IN ('WIP', 'LOW', 'MEDIUM', 'HIGH', 'CRITICAL')),
    confidence REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL,
    last_accessed TEXT NOT NULL,
    previous_memory_id TEXT,
    version INTEGER NOT NULL DEFAULT 1,
    superseded_by TEXT,
    signature TEXT,
    token_count INTEGER,
    platform TEXT,
    session_id TEXT,
    git_commit TEXT,
    git_branch TEXT,

    -- Semantic layer
    embedding BLOB,
    tier TEXT NOT NULL DEFAULT 'CONTEXTUAL' CHECK (tier IN ('CORE', 'ACTIVE', 'CONTEXTUAL', 'DEEP')),

    FOREIGN KEY (agent_id) REFERENCES agents(id),
    FOREIGN KEY (project_id) REFERENCES projects(id),
    CHECK (region = 'AGENT' OR project_id IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_memories_agent_region ON memories(agent_id, region);
CREATE INDEX IF NOT EXISTS idx_memories_project ON memories(project_id);
CREATE INDEX IF NOT EXISTS idx_memories_kind ON memories(kind);
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_memories_impact ON memories(impact);
CREATE INDEX IF NOT EXISTS idx_memories_superseded ON memories(superseded_by);
CREATE INDEX IF NOT EXISTS idx_memories_tier ON memories(tier);
CREATE INDEX IF NOT EXISTS idx_memories_session ON memories(session_id);
CREATE INDEX IF NOT EXISTS idx_memories_git_commit ON memories(git_commit);
CREATE INDEX IF NOT EXISTS idx_memories_git_branch ON memories(git_branch);

CREATE TABLE IF NOT EXISTS memory_links (
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    link_type TEXT NOT NULL CHECK (link_type IN (
        'RELATES_TO', 'BUILDS_ON', 'CONTRADICTS', 'SUPERSEDES'
    )),
    similarity REAL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (source_id, target_id)
);

CREATE INDEX IF NOT EXISTS idx_memory_links_source ON memory_links(source_id);
CREATE INDEX IF NOT EXISTS idx_memory_links_target ON memory_links(target_id);
CREATE INDEX IF NOT EXISTS idx_memory_links_type ON memory_links(link_type);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// V2: curiosity + dissonance queues
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS curiosity_queue (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    region TEXT NOT NULL CHECK (region IN ('AGENT', 'PROJECT')),
    project_id TEXT,
    question TEXT NOT NULL,
    context TEXT,
    recurrence_count INTEGER NOT NULL DEFAULT 1,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('OPEN', 'RESEARCHED', 'DISMISSED')),
    priority_boost INTEGER NOT NULL DEFAULT 0,

    FOREIGN KEY (agent_id) REFERENCES agents(id),
    CHECK (region = 'AGENT' OR project_id IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_curiosity_agent ON curiosity_queue(agent_id);
CREATE INDEX IF NOT EXISTS idx_curiosity_status ON curiosity_queue(status);
CREATE INDEX IF NOT EXISTS idx_curiosity_last_seen ON curiosity_queue(last_seen DESC);

CREATE TABLE IF NOT EXISTS dissonance_queue (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    memory_id_a TEXT NOT NULL,
    memory_id_b TEXT,
    description TEXT NOT NULL,
    detected_at TEXT NOT NULL,
    resolved_at TEXT,
    resolution TEXT,
    status TEXT NOT NULL DEFAULT 'OPEN' CHECK (status IN ('OPEN', 'RESOLVED', 'DISMISSED')),
    dissonance_type TEXT NOT NULL DEFAULT 'CONTRADICTION'
        CHECK (dissonance_type IN ('CONTRADICTION', 'SCOPE_UNCLEAR')),
    suggested_region TEXT,
    suggested_project_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_dissonance_agent ON dissonance_queue(agent_id);
CREATE INDEX IF NOT EXISTS idx_dissonance_status ON dissonance_queue(status);
"#;

/// V3: dream FSM persistence + N3 scope validation bookkeeping
const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS dream_sessions (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    project_id TEXT,
    state TEXT NOT NULL CHECK (state IN (
        'IDLE', 'N2_RUNNING', 'N2_COMPLETE', 'N3_RUNNING', 'N3_COMPLETE',
        'REM_RUNNING', 'COMPLETE'
    )),
    started_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    n2_result_json TEXT,
    n3_result_json TEXT,
    rem_result_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_dream_sessions_agent ON dream_sessions(agent_id);
CREATE INDEX IF NOT EXISTS idx_dream_sessions_state ON dream_sessions(state);

ALTER TABLE memories ADD COLUMN scope_validated INTEGER NOT NULL DEFAULT 0;
"#;

/// Get the schema version recorded in a database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

fn set_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.pragma_update(None, "user_version", version)
}

/// Copy the database file to a timestamped backup path next to it.
fn backup_database(db_path: &Path) -> std::io::Result<PathBuf> {
    let backup_dir = db_path
        .parent()
        .map(|p| p.join("backups"))
        .unwrap_or_else(|| PathBuf::from("backups"));
    std::fs::create_dir_all(&backup_dir)?;

    let stem = db_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("memories");
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let backup_path = backup_dir.join(format!("{stem}_backup_{timestamp}.db"));
    std::fs::copy(db_path, &backup_path)?;
    Ok(backup_path)
}

/// Outcome of a migration run.
#[derive(Debug, Clone, Default)]
pub struct MigrationOutcome {
    pub from_version: u32,
    pub to_version: u32,
    /// Backup file created before upgrading an existing database
    pub backup_path: Option<PathBuf>,
}

/// Errors raised while migrating.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Database error during migration: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Backup failed: {0}")]
    Backup(#[from] std::io::Error),
    #[error("Migration to v{version} failed, database restored from backup: {cause}")]
    StepFailed { version: u32, cause: String },
}

/// Bring a database file up to [`SCHEMA_VERSION`].
///
/// Fresh databases get the full schema with no backup. An out-of-date
/// database is first copied to a timestamped backup; if any step fails the
/// file is restored from that copy before the error is returned.
pub fn run_migrations(db_path: &Path) -> Result<MigrationOutcome, MigrationError> {
    let fresh = !db_path.exists();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path)?;
    let current = if fresh { 0 } else { get_schema_version(&conn)? };

    if current >= SCHEMA_VERSION {
        return Ok(MigrationOutcome {
            from_version: current,
            to_version: current,
            backup_path: None,
        });
    }

    // Only pre-existing data needs a safety copy
    let backup_path = if fresh || current == 0 {
        None
    } else {
        Some(backup_database(db_path)?)
    };

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        tracing::info!(
            version = migration.version,
            "applying migration: {}",
            migration.description
        );
        if let Err(e) = conn
            .execute_batch(migration.up)
            .and_then(|()| set_schema_version(&conn, migration.version))
        {
            drop(conn);
            if let Some(backup) = &backup_path {
                let _ = std::fs::copy(backup, db_path);
            }
            return Err(MigrationError::StepFailed {
                version: migration.version,
                cause: e.to_string(),
            });
        }
    }

    Ok(MigrationOutcome {
        from_version: current,
        to_version: SCHEMA_VERSION,
        backup_path,
    })
}
