//! Session management
//!
//! Sessions group memories by conversation, enabling temporal queries like
//! "as we discussed last session". An LLM has no continuous time; temporal
//! cues become spatial coordinates (session id + project + timestamp + git)
//! that locate memories in the space where they were created.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::storage::{Result, Storage};

pub mod git;
pub mod temporal;

/// Settings key for the current session id.
pub const CURRENT_SESSION_KEY: &str = "current_session_id";

/// Settings key for the current session's start time.
pub const SESSION_START_KEY: &str = "session_start_time";

/// Settings key for the last research timestamp.
pub const LAST_RESEARCH_KEY: &str = "last_research";

/// Settings key holding the id of the pre-compact WIP memory.
pub const PRECOMPACT_MEMORY_KEY: &str = "precompact_memory_id";

/// Generate a new session id: `YYYYMMDD-HHMMSS-XXXXXXXX`.
///
/// The timestamp prefix sorts chronologically; the random suffix keeps ids
/// unique across rapid restarts.
pub fn generate_session_id(now: DateTime<Utc>) -> String {
    let timestamp = now.format("%Y%m%d-%H%M%S");
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    format!("{timestamp}-{suffix}")
}

/// Start a new session: mint an id and record it in settings so memory
/// creation can attach it.
pub fn start_session(store: &Storage) -> Result<String> {
    let now = Utc::now();
    let session_id = generate_session_id(now);
    store.set_setting(CURRENT_SESSION_KEY, &session_id)?;
    store.set_setting(SESSION_START_KEY, &now.to_rfc3339())?;
    Ok(session_id)
}

/// The current session id, or None outside a session.
pub fn get_current_session_id(store: &Storage) -> Result<Option<String>> {
    store.get_setting(CURRENT_SESSION_KEY)
}

/// When the current session started.
pub fn get_session_start_time(store: &Storage) -> Result<Option<DateTime<Utc>>> {
    let Some(value) = store.get_setting(SESSION_START_KEY)? else {
        return Ok(None);
    };
    Ok(DateTime::parse_from_rfc3339(&value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc)))
}

/// The previous session id: the most recent distinct `session_id` among
/// memories, excluding the current one.
pub fn get_previous_session_id(
    store: &Storage,
    agent_id: Option<&str>,
    project_id: Option<&str>,
) -> Result<Option<String>> {
    let current = get_current_session_id(store)?;
    let sessions = store.get_distinct_sessions(agent_id, project_id, 2)?;
    Ok(sessions
        .into_iter()
        .find(|session| Some(session.as_str()) != current.as_deref()))
}

/// Record the id of the WIP memory saved before compaction.
pub fn set_precompact_memory_id(store: &Storage, memory_id: &str) -> Result<()> {
    store.set_setting(PRECOMPACT_MEMORY_KEY, memory_id)
}

/// The WIP memory id awaiting session-end cleanup, if any.
pub fn get_precompact_memory_id(store: &Storage) -> Result<Option<String>> {
    Ok(store
        .get_setting(PRECOMPACT_MEMORY_KEY)?
        .filter(|id| !id.is_empty()))
}

/// Clear the pre-compact marker after cleanup.
pub fn clear_precompact_memory_id(store: &Storage) -> Result<()> {
    store.delete_setting(PRECOMPACT_MEMORY_KEY)
}
