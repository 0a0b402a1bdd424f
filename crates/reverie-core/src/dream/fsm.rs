//! Dream FSM
//!
//! Orchestrates N2 -> N3 -> REM with per-stage checkpointing. Each stage
//! transitions the persisted session to `<stage>_RUNNING` before it runs
//! and `<stage>_COMPLETE` (with its serialized result) after. A crash
//! leaves the session parked at `<stage>_RUNNING`; the next invocation can
//! resume from there, restoring completed stage results from their JSON.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::diary::DiaryStore;
use crate::storage::{Storage, StorageError};

use super::n2::run_n2_consolidation;
use super::n3::run_n3_processing;
use super::rem::run_rem_dreaming;
use super::types::{
    DreamConfig, DreamSession, DreamStage, DreamState, N2Result, N3Result, RemResult,
};

/// Completed dream sessions older than this many days are garbage-collected.
pub const DREAM_SESSION_RETENTION_DAYS: i64 = 30;

/// Errors from the dream FSM.
#[derive(Debug, thiserror::Error)]
pub enum DreamError {
    /// An earlier dream never finished; the caller must pick resume or
    /// restart.
    #[error(
        "Incomplete dream session found (state: {state}, started: {started_at}). \
         Resume it to continue where it left off, or restart to abandon it."
    )]
    IncompleteSession {
        session_id: String,
        state: DreamState,
        started_at: DateTime<Utc>,
    },
    /// There is nothing to resume.
    #[error("No incomplete dream session to resume")]
    NothingToResume,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Failed to serialize stage result: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Results of a completed (or resumed-to-completion) dream.
#[derive(Debug, Clone, Default)]
pub struct DreamOutcome {
    pub session_id: String,
    pub n2: Option<N2Result>,
    pub n3: Option<N3Result>,
    pub rem: Option<RemResult>,
}

/// Runs dream cycles against one store.
pub struct DreamRunner<'a> {
    store: &'a Storage,
    config: DreamConfig,
    diary: DiaryStore,
    journal_dir: PathBuf,
}

impl<'a> DreamRunner<'a> {
    pub fn new(
        store: &'a Storage,
        config: DreamConfig,
        diary: DiaryStore,
        journal_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            config,
            diary,
            journal_dir: journal_dir.into(),
        }
    }

    /// Start a fresh dream cycle.
    ///
    /// Fails with [`DreamError::IncompleteSession`] when an unfinished
    /// session exists; the caller chooses [`DreamRunner::resume`] or
    /// [`DreamRunner::restart`].
    pub fn dream(
        &self,
        agent_id: &str,
        project_id: Option<&str>,
    ) -> Result<DreamOutcome, DreamError> {
        if let Some(active) = self.store.get_active_dream_session(agent_id, project_id)? {
            return Err(DreamError::IncompleteSession {
                session_id: active.id,
                state: active.state,
                started_at: active.started_at,
            });
        }

        // Only process material newer than the last completed dream
        let since_last_dream = self
            .store
            .get_last_completed_dream_session(agent_id, project_id)?
            .map(|session| session.updated_at);

        let session = self.store.start_dream_session(agent_id, project_id)?;
        tracing::info!(session_id = %session.id, "entering dream mode");

        let outcome = self.run_stages(
            &session,
            &self.config.stages,
            agent_id,
            project_id,
            since_last_dream,
            DreamOutcome {
                session_id: session.id.clone(),
                ..DreamOutcome::default()
            },
        )?;

        self.store.complete_dream_session(&session.id)?;
        Ok(outcome)
    }

    /// Resume an interrupted session from its last completed stage.
    /// Completed stage results are restored from their checkpoints;
    /// a stage interrupted mid-run is re-run (stages are idempotent).
    pub fn resume(
        &self,
        agent_id: &str,
        project_id: Option<&str>,
    ) -> Result<DreamOutcome, DreamError> {
        let Some(session) = self.store.get_active_dream_session(agent_id, project_id)? else {
            return Err(DreamError::NothingToResume);
        };
        tracing::info!(
            session_id = %session.id,
            state = %session.state,
            "resuming dream session"
        );

        let mut outcome = DreamOutcome {
            session_id: session.id.clone(),
            ..DreamOutcome::default()
        };
        if let Some(json) = &session.n2_result_json {
            outcome.n2 = Some(serde_json::from_str(json)?);
        }
        if let Some(json) = &session.n3_result_json {
            outcome.n3 = Some(serde_json::from_str(json)?);
        }

        let since_last_dream = self
            .store
            .get_last_completed_dream_session(agent_id, project_id)?
            .map(|completed| completed.updated_at);

        let remaining = session.state.remaining_stages();
        let outcome = self.run_stages(
            &session,
            &remaining,
            agent_id,
            project_id,
            since_last_dream,
            outcome,
        )?;

        self.store.complete_dream_session(&session.id)?;
        Ok(outcome)
    }

    /// Abandon any incomplete session and start fresh.
    pub fn restart(
        &self,
        agent_id: &str,
        project_id: Option<&str>,
    ) -> Result<DreamOutcome, DreamError> {
        if let Some(active) = self.store.get_active_dream_session(agent_id, project_id)? {
            tracing::info!(session_id = %active.id, "abandoning incomplete dream session");
            self.store.abandon_dream_session(&active.id)?;
        }
        self.dream(agent_id, project_id)
    }

    /// Garbage-collect old completed sessions.
    pub fn cleanup(&self) -> Result<usize, DreamError> {
        Ok(self
            .store
            .cleanup_old_dream_sessions(DREAM_SESSION_RETENTION_DAYS)?)
    }

    fn run_stages(
        &self,
        session: &DreamSession,
        stages: &[DreamStage],
        agent_id: &str,
        project_id: Option<&str>,
        since_last_dream: Option<DateTime<Utc>>,
        mut outcome: DreamOutcome,
    ) -> Result<DreamOutcome, DreamError> {
        for stage in stages {
            match stage {
                DreamStage::N2 => {
                    self.store.update_dream_state(
                        &session.id,
                        DreamState::N2Running,
                        None,
                        None,
                        None,
                    )?;
                    let result = run_n2_consolidation(self.store, agent_id, project_id, &self.config)?;
                    let json = serde_json::to_string(&result)?;
                    self.store.update_dream_state(
                        &session.id,
                        DreamState::N2Complete,
                        Some(&json),
                        None,
                        None,
                    )?;
                    outcome.n2 = Some(result);
                }
                DreamStage::N3 => {
                    self.store.update_dream_state(
                        &session.id,
                        DreamState::N3Running,
                        None,
                        None,
                        None,
                    )?;
                    let result = run_n3_processing(self.store, agent_id, project_id, &self.config)?;
                    let json = serde_json::to_string(&result)?;
                    self.store.update_dream_state(
                        &session.id,
                        DreamState::N3Complete,
                        None,
                        Some(&json),
                        None,
                    )?;
                    outcome.n3 = Some(result);
                }
                DreamStage::Rem => {
                    self.store.update_dream_state(
                        &session.id,
                        DreamState::RemRunning,
                        None,
                        None,
                        None,
                    )?;
                    let result = run_rem_dreaming(
                        self.store,
                        agent_id,
                        project_id,
                        &self.config,
                        &self.diary,
                        &self.journal_dir,
                        since_last_dream,
                    )?;
                    let json = serde_json::to_string(&result)?;
                    self.store.update_dream_state(
                        &session.id,
                        DreamState::Complete,
                        None,
                        None,
                        Some(&json),
                    )?;
                    outcome.rem = Some(result);
                }
            }
        }
        Ok(outcome)
    }
}
