//! Dissonance queue
//!
//! Cognitive conflicts awaiting human resolution: contradictions between two
//! memories, and scope issues where a single memory looks mis-assigned to
//! its region. The engine only queues these; it never resolves them itself.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sqlite::{Result, Storage, StorageError, parse_optional_timestamp, parse_timestamp};

/// Status of a dissonance item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DissonanceStatus {
    /// Awaiting human resolution
    Open,
    /// Human helped resolve
    Resolved,
    /// Not actually a conflict
    Dismissed,
}

impl DissonanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DissonanceStatus::Open => "OPEN",
            DissonanceStatus::Resolved => "RESOLVED",
            DissonanceStatus::Dismissed => "DISMISSED",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(DissonanceStatus::Open),
            "RESOLVED" => Some(DissonanceStatus::Resolved),
            "DISMISSED" => Some(DissonanceStatus::Dismissed),
            _ => None,
        }
    }
}

/// Kind of dissonance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DissonanceKind {
    /// Two memories conflict
    Contradiction,
    /// A memory might live in the wrong region
    ScopeUnclear,
}

impl DissonanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DissonanceKind::Contradiction => "CONTRADICTION",
            DissonanceKind::ScopeUnclear => "SCOPE_UNCLEAR",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "CONTRADICTION" => Some(DissonanceKind::Contradiction),
            "SCOPE_UNCLEAR" => Some(DissonanceKind::ScopeUnclear),
            _ => None,
        }
    }
}

/// A flagged cognitive conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dissonance {
    pub id: String,
    pub agent_id: String,
    pub memory_id_a: String,
    /// None for SCOPE_UNCLEAR (single-memory issue)
    pub memory_id_b: Option<String>,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
    pub status: DissonanceStatus,
    pub kind: DissonanceKind,
    /// For SCOPE_UNCLEAR: suggested region name
    pub suggested_region: Option<String>,
    /// For SCOPE_UNCLEAR: suggested project
    pub suggested_project_id: Option<String>,
}

impl Storage {
    /// Queue a contradiction between two memories.
    pub fn add_dissonance(
        &self,
        agent_id: &str,
        memory_id_a: &str,
        memory_id_b: &str,
        description: &str,
    ) -> Result<Dissonance> {
        let dissonance = Dissonance {
            id: Uuid::new_v4().to_string()[..8].to_string(),
            agent_id: agent_id.to_string(),
            memory_id_a: memory_id_a.to_string(),
            memory_id_b: Some(memory_id_b.to_string()),
            description: description.to_string(),
            detected_at: Utc::now(),
            resolved_at: None,
            resolution: None,
            status: DissonanceStatus::Open,
            kind: DissonanceKind::Contradiction,
            suggested_region: None,
            suggested_project_id: None,
        };

        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO dissonance_queue
             (id, agent_id, memory_id_a, memory_id_b, description, detected_at, status, dissonance_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                dissonance.id,
                dissonance.agent_id,
                dissonance.memory_id_a,
                dissonance.memory_id_b,
                dissonance.description,
                dissonance.detected_at.to_rfc3339(),
                dissonance.status.as_str(),
                dissonance.kind.as_str(),
            ],
        )?;

        Ok(dissonance)
    }

    /// Queue a scope issue (a memory that may belong in another region).
    pub fn add_scope_issue(
        &self,
        agent_id: &str,
        memory_id: &str,
        description: &str,
        suggested_region: &str,
        suggested_project_id: Option<&str>,
    ) -> Result<Dissonance> {
        let dissonance = Dissonance {
            id: Uuid::new_v4().to_string()[..8].to_string(),
            agent_id: agent_id.to_string(),
            memory_id_a: memory_id.to_string(),
            memory_id_b: None,
            description: description.to_string(),
            detected_at: Utc::now(),
            resolved_at: None,
            resolution: None,
            status: DissonanceStatus::Open,
            kind: DissonanceKind::ScopeUnclear,
            suggested_region: Some(suggested_region.to_string()),
            suggested_project_id: suggested_project_id.map(String::from),
        };

        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO dissonance_queue
             (id, agent_id, memory_id_a, memory_id_b, description, detected_at, status,
              dissonance_type, suggested_region, suggested_project_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                dissonance.id,
                dissonance.agent_id,
                dissonance.memory_id_a,
                Option::<String>::None,
                dissonance.description,
                dissonance.detected_at.to_rfc3339(),
                dissonance.status.as_str(),
                dissonance.kind.as_str(),
                dissonance.suggested_region,
                dissonance.suggested_project_id,
            ],
        )?;

        Ok(dissonance)
    }

    pub fn get_dissonance(&self, dissonance_id: &str) -> Result<Option<Dissonance>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare("SELECT * FROM dissonance_queue WHERE id = ?1")?;
        let mut rows = stmt.query(params![dissonance_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_dissonance(row)?)),
            None => Ok(None),
        }
    }

    /// All open dissonances for an agent.
    pub fn get_open_dissonances(&self, agent_id: &str) -> Result<Vec<Dissonance>> {
        self.query_dissonances(
            "SELECT * FROM dissonance_queue WHERE agent_id = ?1 AND status = 'OPEN'
             ORDER BY detected_at DESC",
            agent_id,
        )
    }

    /// Open scope issues only.
    pub fn get_open_scope_issues(&self, agent_id: &str) -> Result<Vec<Dissonance>> {
        self.query_dissonances(
            "SELECT * FROM dissonance_queue
             WHERE agent_id = ?1 AND status = 'OPEN' AND dissonance_type = 'SCOPE_UNCLEAR'
             ORDER BY detected_at DESC",
            agent_id,
        )
    }

    pub fn resolve_dissonance(&self, dissonance_id: &str, resolution: &str) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "UPDATE dissonance_queue SET status = 'RESOLVED', resolution = ?1, resolved_at = ?2
             WHERE id = ?3",
            params![resolution, Utc::now().to_rfc3339(), dissonance_id],
        )?;
        Ok(())
    }

    pub fn dismiss_dissonance(&self, dissonance_id: &str) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "UPDATE dissonance_queue SET status = 'DISMISSED', resolved_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), dissonance_id],
        )?;
        Ok(())
    }

    pub fn count_open_dissonances(&self, agent_id: &str) -> Result<usize> {
        let conn = self.reader()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM dissonance_queue WHERE agent_id = ?1 AND status = 'OPEN'",
            params![agent_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Whether a dissonance already exists for this memory pair, in either
    /// order. Dream re-runs use this for idempotence.
    pub fn dissonance_exists(&self, memory_id_a: &str, memory_id_b: &str) -> Result<bool> {
        let conn = self.reader()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM dissonance_queue
             WHERE (memory_id_a = ?1 AND memory_id_b = ?2)
                OR (memory_id_a = ?2 AND memory_id_b = ?1)",
            params![memory_id_a, memory_id_b],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Whether a scope issue already exists for this memory.
    pub fn scope_issue_exists(&self, memory_id: &str) -> Result<bool> {
        let conn = self.reader()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM dissonance_queue
             WHERE memory_id_a = ?1 AND dissonance_type = 'SCOPE_UNCLEAR'",
            params![memory_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn query_dissonances(&self, sql: &str, agent_id: &str) -> Result<Vec<Dissonance>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params![agent_id])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(row_to_dissonance(row)?);
        }
        Ok(result)
    }
}

fn row_to_dissonance(row: &rusqlite::Row<'_>) -> Result<Dissonance> {
    let status_str: String = row.get("status")?;
    let kind_str: String = row.get("dissonance_type")?;
    let detected_at: String = row.get("detected_at")?;
    let resolved_at: Option<String> = row.get("resolved_at")?;

    Ok(Dissonance {
        id: row.get("id")?,
        agent_id: row.get("agent_id")?,
        memory_id_a: row.get("memory_id_a")?,
        memory_id_b: row.get("memory_id_b")?,
        description: row.get("description")?,
        detected_at: parse_timestamp(&detected_at)?,
        resolved_at: parse_optional_timestamp(resolved_at)?,
        resolution: row.get("resolution")?,
        status: DissonanceStatus::parse_name(&status_str)
            .ok_or_else(|| StorageError::Validation(format!("unknown status '{status_str}'")))?,
        kind: DissonanceKind::parse_name(&kind_str)
            .ok_or_else(|| StorageError::Validation(format!("unknown dissonance type '{kind_str}'")))?,
        suggested_region: row.get("suggested_region")?,
        suggested_project_id: row.get("suggested_project_id")?,
    })
}
