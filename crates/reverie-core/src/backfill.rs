//! Backfill
//!
//! Retrofits the semantic layer onto memories created before embeddings
//! existed (or whose embedding failed): generates missing vectors in
//! batches, re-assigns tiers, creates RELATES_TO links, and retroactively
//! detects BUILDS_ON relationships with a widened time window.

use std::collections::HashSet;

use chrono::Utc;

use crate::embeddings::{EmbeddingError, TextEmbedder};
use crate::graph::LinkKind;
use crate::graph::linker::{
    DEFAULT_SIMILARITY_THRESHOLD, find_builds_on_candidates, find_link_candidates,
};
use crate::memory::tier::classify_tier;
use crate::storage::{Storage, StorageError};

/// Memories embedded per batch.
const BACKFILL_BATCH_SIZE: usize = 32;

/// RELATES_TO links created per backfilled memory.
const BACKFILL_MAX_LINKS: usize = 5;

/// Widened BUILDS_ON window for retroactive detection (one week), since
/// backfilled memories were not processed in real time.
const BACKFILL_TIME_WINDOW_HOURS: i64 = 168;

/// BUILDS_ON candidates per memory.
const BACKFILL_MAX_BUILDS_ON: usize = 3;

/// Errors from backfill runs.
#[derive(Debug, thiserror::Error)]
pub enum BackfillError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Counters for a backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillOutcome {
    pub embeddings_generated: usize,
    pub tiers_assigned: usize,
    pub links_created: usize,
}

/// Generate embeddings for memories that lack them, re-assign their tiers,
/// and create RELATES_TO links. Set `skip_links` to only embed.
pub fn run_embedding_backfill(
    store: &Storage,
    embedder: &dyn TextEmbedder,
    agent_id: &str,
    skip_links: bool,
) -> Result<BackfillOutcome, BackfillError> {
    let pending = store.get_memories_without_embeddings(agent_id, None)?;
    if pending.is_empty() {
        return Ok(BackfillOutcome::default());
    }
    tracing::info!(count = pending.len(), "backfilling embeddings");

    let now = Utc::now();
    let mut outcome = BackfillOutcome::default();

    for batch in pending.chunks(BACKFILL_BATCH_SIZE) {
        let texts: Vec<&str> = batch.iter().map(|(_, content)| content.as_str()).collect();
        let embeddings = embedder.embed_batch(&texts)?;

        for ((memory_id, _), embedding) in batch.iter().zip(embeddings.iter()) {
            store.save_embedding(memory_id, embedding)?;
            outcome.embeddings_generated += 1;

            if let Some(memory) = store.get_memory(memory_id)? {
                let tier = classify_tier(
                    memory.impact,
                    memory.kind,
                    memory.last_accessed,
                    memory.created_at,
                    now,
                );
                store.update_tier(memory_id, tier)?;
                outcome.tiers_assigned += 1;
            }
        }

        if skip_links {
            continue;
        }

        let candidates = store.get_memories_with_embeddings(agent_id, None, None, false)?;
        for ((memory_id, _), embedding) in batch.iter().zip(embeddings.iter()) {
            let exclude: HashSet<String> = [memory_id.clone()].into();
            for candidate in find_link_candidates(
                embedding,
                &candidates,
                DEFAULT_SIMILARITY_THRESHOLD,
                BACKFILL_MAX_LINKS,
                &exclude,
            ) {
                store.save_link(
                    memory_id,
                    &candidate.memory_id,
                    LinkKind::RelatesTo,
                    Some(candidate.similarity),
                )?;
                outcome.links_created += 1;
            }
        }
    }

    tracing::info!(
        embeddings = outcome.embeddings_generated,
        tiers = outcome.tiers_assigned,
        links = outcome.links_created,
        "embedding backfill finished"
    );
    Ok(outcome)
}

/// Retroactively detect BUILDS_ON links across all embedded memories,
/// oldest first, with the widened week-long window. Existing links are
/// never duplicated. Returns the number of links created.
pub fn run_builds_on_backfill(store: &Storage, agent_id: &str) -> Result<usize, BackfillError> {
    let mut memories = store.get_memories_with_temporal_context(agent_id, None, false)?;
    if memories.is_empty() {
        return Ok(0);
    }

    // Oldest first so chains build in chronological order
    memories.sort_by_key(|m| m.created_at);

    let ids: Vec<String> = memories.iter().map(|m| m.id.clone()).collect();
    let mut existing_pairs = store.get_existing_link_pairs(&ids)?;

    let mut total_links = 0;
    for memory in &memories {
        let older: Vec<_> = memories
            .iter()
            .filter(|m| m.created_at < memory.created_at)
            .cloned()
            .collect();
        if older.is_empty() {
            continue;
        }

        for candidate in find_builds_on_candidates(
            &memory.content,
            &memory.embedding,
            memory.session_id.as_deref(),
            memory.created_at,
            &older,
            DEFAULT_SIMILARITY_THRESHOLD,
            BACKFILL_TIME_WINDOW_HOURS,
            BACKFILL_MAX_BUILDS_ON,
        ) {
            let forward = (memory.id.clone(), candidate.memory_id.clone());
            let reverse = (candidate.memory_id.clone(), memory.id.clone());
            if existing_pairs.contains(&forward) || existing_pairs.contains(&reverse) {
                continue;
            }

            store.save_link(
                &memory.id,
                &candidate.memory_id,
                LinkKind::BuildsOn,
                Some(candidate.similarity),
            )?;
            existing_pairs.insert(forward);
            total_links += 1;
        }
    }

    tracing::info!(links = total_links, "builds-on backfill finished");
    Ok(total_links)
}
