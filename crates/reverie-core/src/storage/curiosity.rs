//! Curiosity queue
//!
//! Open questions the agent wants to research. Adding an identical question
//! bumps its recurrence count instead of duplicating; listing is ordered by
//! a priority score (recurrence x 10 + boost + recency bonus).

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::Region;

use super::sqlite::{Result, Storage, StorageError, parse_timestamp};

/// Recency bonus window in days.
const RECENCY_BONUS_DAYS: i64 = 7;

/// Status of a curiosity item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CuriosityStatus {
    /// Not yet researched
    Open,
    /// Research completed
    Researched,
    /// Decided not to pursue
    Dismissed,
}

impl CuriosityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CuriosityStatus::Open => "OPEN",
            CuriosityStatus::Researched => "RESEARCHED",
            CuriosityStatus::Dismissed => "DISMISSED",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(CuriosityStatus::Open),
            "RESEARCHED" => Some(CuriosityStatus::Researched),
            "DISMISSED" => Some(CuriosityStatus::Dismissed),
            _ => None,
        }
    }
}

/// A question or topic in the research queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curiosity {
    pub id: String,
    pub agent_id: String,
    pub region: Region,
    pub project_id: Option<String>,
    pub question: String,
    pub context: Option<String>,
    pub recurrence_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub status: CuriosityStatus,
    pub priority_boost: i64,
}

impl Curiosity {
    /// Priority for queue ordering: recurrence x 10 + boost, plus 5 when
    /// seen within the last 7 days.
    pub fn priority_score(&self, now: DateTime<Utc>) -> i64 {
        let mut score = self.recurrence_count * 10 + self.priority_boost;
        if now - self.last_seen <= Duration::days(RECENCY_BONUS_DAYS) {
            score += 5;
        }
        score
    }
}

impl Storage {
    /// Add a question to the curiosity queue.
    ///
    /// An existing OPEN curiosity with identical question text gets its
    /// recurrence bumped instead of creating a duplicate.
    pub fn add_curiosity(
        &self,
        agent_id: &str,
        question: &str,
        region: Region,
        project_id: Option<&str>,
        context: Option<&str>,
    ) -> Result<Curiosity> {
        if region == Region::Project && project_id.is_none() {
            return Err(StorageError::Validation(
                "PROJECT-region curiosity requires a project_id".into(),
            ));
        }

        if let Some(existing) = self.find_curiosity_by_question(agent_id, question)? {
            self.bump_curiosity_recurrence(&existing.id)?;
            return self
                .get_curiosity(&existing.id)?
                .ok_or_else(|| StorageError::NotFound(existing.id));
        }

        let now = Utc::now();
        let curiosity = Curiosity {
            id: Uuid::new_v4().to_string()[..8].to_string(),
            agent_id: agent_id.to_string(),
            region,
            project_id: project_id.map(String::from),
            question: question.to_string(),
            context: context.map(String::from),
            recurrence_count: 1,
            first_seen: now,
            last_seen: now,
            status: CuriosityStatus::Open,
            priority_boost: 0,
        };

        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO curiosity_queue (
                id, agent_id, region, project_id, question, context,
                recurrence_count, first_seen, last_seen, status, priority_boost
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                curiosity.id,
                curiosity.agent_id,
                curiosity.region.as_str(),
                curiosity.project_id,
                curiosity.question,
                curiosity.context,
                curiosity.recurrence_count,
                curiosity.first_seen.to_rfc3339(),
                curiosity.last_seen.to_rfc3339(),
                curiosity.status.as_str(),
                curiosity.priority_boost,
            ],
        )?;

        Ok(curiosity)
    }

    /// Get a curiosity by id, with prefix matching as a fallback.
    pub fn get_curiosity(&self, curiosity_id: &str) -> Result<Option<Curiosity>> {
        let conn = self.reader()?;

        let exact = query_curiosity_row(
            &conn,
            "SELECT * FROM curiosity_queue WHERE id = ?1",
            curiosity_id,
        )?;
        if exact.is_some() {
            return Ok(exact);
        }

        let pattern = format!("{}%", super::sqlite::escape_like_pattern(curiosity_id));
        query_curiosity_row(
            &conn,
            "SELECT * FROM curiosity_queue WHERE id LIKE ?1 ESCAPE '\\'",
            &pattern,
        )
    }

    /// Curiosities for an agent, sorted by priority score (highest first).
    pub fn get_curiosities(
        &self,
        agent_id: &str,
        region: Option<Region>,
        project_id: Option<&str>,
        status: CuriosityStatus,
    ) -> Result<Vec<Curiosity>> {
        let mut sql = String::from("SELECT * FROM curiosity_queue WHERE agent_id = ? AND status = ?");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(agent_id.to_string()), Box::new(status.as_str())];
        if let Some(region) = region {
            sql.push_str(" AND region = ?");
            args.push(Box::new(region.as_str()));
        }
        if let Some(project_id) = project_id {
            sql.push_str(" AND (project_id = ? OR region = 'AGENT')");
            args.push(Box::new(project_id.to_string()));
        }

        let conn = self.reader()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())))?;

        let mut curiosities = Vec::new();
        while let Some(row) = rows.next()? {
            curiosities.push(row_to_curiosity(row)?);
        }
        drop(rows);
        drop(stmt);
        drop(conn);

        let now = Utc::now();
        curiosities.sort_by_key(|c| std::cmp::Reverse(c.priority_score(now)));
        Ok(curiosities)
    }

    /// The highest-priority open curiosity, if any.
    pub fn get_top_curiosity(
        &self,
        agent_id: &str,
        region: Option<Region>,
        project_id: Option<&str>,
    ) -> Result<Option<Curiosity>> {
        Ok(self
            .get_curiosities(agent_id, region, project_id, CuriosityStatus::Open)?
            .into_iter()
            .next())
    }

    /// Increment recurrence and refresh last_seen.
    pub fn bump_curiosity_recurrence(&self, curiosity_id: &str) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "UPDATE curiosity_queue
             SET recurrence_count = recurrence_count + 1, last_seen = ?1
             WHERE id = ?2",
            params![Utc::now().to_rfc3339(), curiosity_id],
        )?;
        Ok(())
    }

    pub fn update_curiosity_status(
        &self,
        curiosity_id: &str,
        status: CuriosityStatus,
    ) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "UPDATE curiosity_queue SET status = ?1 WHERE id = ?2",
            params![status.as_str(), curiosity_id],
        )?;
        Ok(())
    }

    pub fn boost_curiosity_priority(&self, curiosity_id: &str, boost: i64) -> Result<()> {
        let conn = self.writer()?;
        conn.execute(
            "UPDATE curiosity_queue SET priority_boost = priority_boost + ?1 WHERE id = ?2",
            params![boost, curiosity_id],
        )?;
        Ok(())
    }

    /// Exact-question match among OPEN curiosities.
    fn find_curiosity_by_question(
        &self,
        agent_id: &str,
        question: &str,
    ) -> Result<Option<Curiosity>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM curiosity_queue
             WHERE agent_id = ?1 AND question = ?2 AND status = 'OPEN'",
        )?;
        let mut rows = stmt.query(params![agent_id, question])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_curiosity(row)?)),
            None => Ok(None),
        }
    }

    pub fn count_open_curiosities(
        &self,
        agent_id: &str,
        project_id: Option<&str>,
    ) -> Result<usize> {
        let mut sql = String::from(
            "SELECT COUNT(*) FROM curiosity_queue WHERE agent_id = ? AND status = 'OPEN'",
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
}

fn query_curiosity_row(
    conn: &rusqlite::Connection,
    sql: &str,
    key: &str,
) -> Result<Option<Curiosity>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params![key])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_curiosity(row)?)),
        None => Ok(None),
    }
}

fn row_to_curiosity(row: &rusqlite::Row<'_>) -> Result<Curiosity> {
    let region_str: String = row.get("region")?;
    let status_str: String = row.get("status")?;
    let first_seen: String = row.get("first_seen")?;
    let last_seen: String = row.get("last_seen")?;

    Ok(Curiosity {
        id: row.get("id")?,
        agent_id: row.get("agent_id")?,
        region: Region::parse_name(&region_str)
            .ok_or_else(|| StorageError::Validation(format!("unknown region '{region_str}'")))?,
        project_id: row.get("project_id")?,
        question: row.get("question")?,
        context: row.get("context")?,
        recurrence_count: row.get("recurrence_count")?,
        first_seen: parse_timestamp(&first_seen)?,
        last_seen: parse_timestamp(&last_seen)?,
        status: CuriosityStatus::parse_name(&status_str)
            .ok_or_else(|| StorageError::Validation(format!("unknown status '{status_str}'")))?,
        priority_boost: row.get("priority_boost")?,
    })
}
