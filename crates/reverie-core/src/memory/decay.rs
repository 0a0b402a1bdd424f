//! Age-based memory decay
//!
//! Runs at session end. Content is progressively compacted as a memory ages
//! past its impact-level window, always preserving the first sentence and any
//! sentences carrying critical signal words. CRITICAL memories are never
//! touched; fully-emptied records are deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{Result, Storage};
use crate::text::split_sentences;

use super::{Impact, Memory};

/// Signal words that keep a sentence alive through compaction.
const KEEP_SIGNALS: &[&str] = &[
    "never", "always", "must", "critical", "essential", "crucial", "vital",
];

/// Days before each impact level starts decaying.
fn decay_window_days(impact: Impact) -> Option<i64> {
    match impact {
        Impact::Low => Some(1),
        Impact::Medium => Some(7),
        Impact::High => Some(30),
        // WIP records are cleaned up explicitly at session end, not decayed;
        // CRITICAL keeps full detail forever.
        Impact::Wip | Impact::Critical => None,
    }
}

/// Summary of a decay pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecayOutcome {
    /// Ids of memories whose content was compacted
    pub compacted: Vec<String>,
    /// Number of emptied memories deleted
    pub deleted: usize,
}

/// Session-end decay processor.
pub struct DecayEngine;

impl DecayEngine {
    /// Compact the content of a memory that has aged past its window.
    ///
    /// Returns `None` when no change is needed, `Some("")` when the record
    /// decayed to nothing (deletion candidate), otherwise the new content.
    pub fn compact_content(content: &str, impact: Impact, age_days: i64) -> Option<String> {
        let window = decay_window_days(impact)?;
        if age_days <= window {
            return None;
        }

        let sentences = split_sentences(content);
        if sentences.is_empty() {
            return Some(String::new());
        }

        // Past 4x the window only the first sentence survives; before that,
        // signal sentences are kept alongside it.
        let deep_decay = age_days > window * 4;

        let mut kept: Vec<&str> = vec![sentences[0].as_str()];
        if !deep_decay {
            for sentence in &sentences[1..] {
                let lower = sentence.to_lowercase();
                if KEEP_SIGNALS.iter().any(|signal| lower.contains(signal)) {
                    kept.push(sentence.as_str());
                }
            }
        }

        let compacted = kept.join(" ");
        if compacted == content.trim() {
            return None;
        }
        Some(compacted)
    }

    /// Decay all non-superseded memories for an agent/project.
    pub fn process_decay(
        store: &Storage,
        agent_id: &str,
        project_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DecayOutcome> {
        let memories = store.get_memories_for_agent(
            agent_id,
            None,
            project_id,
            None,
            false,
            None,
        )?;

        let mut outcome = DecayOutcome::default();

        for mut memory in memories {
            let age_days = (now - memory.created_at).num_days();
            let Some(new_content) =
                Self::compact_content(&memory.content, memory.impact, age_days)
            else {
                continue;
            };

            if new_content.is_empty() {
                store.delete_memory(&memory.id)?;
                outcome.deleted += 1;
                tracing::debug!(memory_id = %memory.id, "deleted fully-decayed memory");
            } else {
                memory.content = new_content;
                store.save_memory(&memory)?;
                outcome.compacted.push(memory.id);
            }
        }

        tracing::info!(
            compacted = outcome.compacted.len(),
            deleted = outcome.deleted,
            "decay pass finished"
        );
        Ok(outcome)
    }

    /// Memories with CRITICAL impact are exempt, regardless of age.
    pub fn is_exempt(memory: &Memory) -> bool {
        decay_window_days(memory.impact).is_none()
    }
}
