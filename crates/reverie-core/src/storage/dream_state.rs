//! Dream session persistence
//!
//! FSM checkpointing on the `dream_sessions` table: state transitions plus
//! the serialized per-stage results, so an interrupted dream resumes from
//! its last completed stage.

use chrono::{Duration, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::dream::types::{DreamSession, DreamState};

use super::sqlite::{Result, Storage, StorageError, parse_timestamp};

impl Storage {
    /// Create a fresh dream session in IDLE state.
    pub fn start_dream_session(
        &self,
        agent_id: &str,
        project_id: Option<&str>,
    ) -> Result<DreamSession> {
        let now = Utc::now();
        let session = DreamSession {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            project_id: project_id.map(String::from),
            state: DreamState::Idle,
            started_at: now,
            updated_at: now,
            n2_result_json: None,
            n3_result_json: None,
            rem_result_json: None,
        };

        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO dream_sessions (id, agent_id, project_id, state, started_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id,
                session.agent_id,
                session.project_id,
                session.state.as_str(),
                session.started_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(session)
    }

    pub fn get_dream_session(&self, session_id: &str) -> Result<Option<DreamSession>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare("SELECT * FROM dream_sessions WHERE id = ?1")?;
        let mut rows = stmt.query(params![session_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_dream_session(row)?)),
            None => Ok(None),
        }
    }

    /// The most recent incomplete session for this agent/project, if any.
    /// Incomplete means a state outside {IDLE, COMPLETE}; an IDLE session
    /// that never transitioned counts as an abandoned start, not active work.
    pub fn get_active_dream_session(
        &self,
        agent_id: &str,
        project_id: Option<&str>,
    ) -> Result<Option<DreamSession>> {
        self.query_latest_session(
            agent_id,
            project_id,
            "state NOT IN ('IDLE', 'COMPLETE')",
        )
    }

    /// The most recent COMPLETE session; its `updated_at` supplies the
    /// "since last dream" cutoff for REM.
    pub fn get_last_completed_dream_session(
        &self,
        agent_id: &str,
        project_id: Option<&str>,
    ) -> Result<Option<DreamSession>> {
        self.query_latest_session(agent_id, project_id, "state = 'COMPLETE'")
    }

    fn query_latest_session(
        &self,
        agent_id: &str,
        project_id: Option<&str>,
        state_clause: &str,
    ) -> Result<Option<DreamSession>> {
        let conn = self.reader()?;
        let (sql, key) = match project_id {
            Some(project_id) => (
                format!(
                    "SELECT * FROM dream_sessions
                     WHERE agent_id = ?1 AND project_id = ?2 AND {state_clause}
                     ORDER BY updated_at DESC LIMIT 1"
                ),
                Some(project_id),
            ),
            None => (
                format!(
                    "SELECT * FROM dream_sessions
                     WHERE agent_id = ?1 AND project_id IS NULL AND {state_clause}
                     ORDER BY updated_at DESC LIMIT 1"
                ),
                None,
            ),
        };

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = match key {
            Some(project_id) => stmt.query(params![agent_id, project_id])?,
            None => stmt.query(params![agent_id])?,
        };
        match rows.next()? {
            Some(row) => Ok(Some(row_to_dream_session(row)?)),
            None => Ok(None),
        }
    }

    /// Transition a session's state, optionally checkpointing stage results.
    pub fn update_dream_state(
        &self,
        session_id: &str,
        state: DreamState,
        n2_result_json: Option<&str>,
        n3_result_json: Option<&str>,
        rem_result_json: Option<&str>,
    ) -> Result<()> {
        let mut sql = String::from("UPDATE dream_sessions SET state = ?, updated_at = ?");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(state.as_str()),
            Box::new(Utc::now().to_rfc3339()),
        ];

        if let Some(json) = n2_result_json {
            sql.push_str(", n2_result_json = ?");
            args.push(Box::new(json.to_string()));
        }
        if let Some(json) = n3_result_json {
            sql.push_str(", n3_result_json = ?");
            args.push(Box::new(json.to_string()));
        }
        if let Some(json) = rem_result_json {
            sql.push_str(", rem_result_json = ?");
            args.push(Box::new(json.to_string()));
        }

        sql.push_str(" WHERE id = ?");
        args.push(Box::new(session_id.to_string()));

        let conn = self.writer()?;
        let updated = conn.execute(
            &sql,
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(session_id.to_string()));
        }
        Ok(())
    }

    /// Mark a session COMPLETE.
    pub fn complete_dream_session(&self, session_id: &str) -> Result<()> {
        self.update_dream_state(session_id, DreamState::Complete, None, None, None)
    }

    /// Delete an incomplete session (the caller chose restart over resume).
    pub fn abandon_dream_session(&self, session_id: &str) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "DELETE FROM dream_sessions WHERE id = ?1",
            params![session_id],
        )?;
        Ok(())
    }

    /// Garbage-collect COMPLETE sessions older than the retention window.
    /// Returns the number removed.
    pub fn cleanup_old_dream_sessions(&self, retention_days: i64) -> Result<usize> {
        let cutoff = (Utc::now() - Duration::days(retention_days)).to_rfc3339();
        let conn = self.writer()?;
        let removed = conn.execute(
            "DELETE FROM dream_sessions WHERE state = 'COMPLETE' AND updated_at < ?1",
            params![cutoff],
        )?;
        Ok(removed)
    }
}

fn row_to_dream_session(row: &rusqlite::Row<'_>) -> Result<DreamSession> {
    let state_str: String = row.get("state")?;
    let started_at: String = row.get("started_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(DreamSession {
        id: row.get("id")?,
        agent_id: row.get("agent_id")?,
        project_id: row.get("project_id")?,
        state: DreamState::parse_name(&state_str)
            .ok_or_else(|| StorageError::Validation(format!("unknown dream state '{state_str}'")))?,
        started_at: parse_timestamp(&started_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        n2_result_json: row.get("n2_result_json")?,
        n3_result_json: row.get("n3_result_json")?,
        rem_result_json: row.get("rem_result_json")?,
    })
}
