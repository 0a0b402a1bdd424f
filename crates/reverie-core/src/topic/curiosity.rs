//! Curiosity bridge
//!
//! Matches the current conversation topic against open questions in the
//! curiosity queue. Returning to a topic we were curious about is the
//! natural moment to surface the open question.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::embeddings::{EmbeddingError, TextEmbedder, cosine_similarity};
use crate::storage::{Curiosity, CuriosityStatus, Storage, StorageError};

/// Minimum similarity for a curiosity to count as a match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.5;

/// Similarity above which a match counts as strong.
const STRONG_MATCH: f32 = 0.7;

/// Capacity of the advisory embedding cache.
const EMBEDDING_CACHE_SIZE: usize = 256;

/// Errors from bridge lookups.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// A curiosity that matches the current topic.
#[derive(Debug, Clone)]
pub struct CuriosityMatch {
    pub curiosity: Curiosity,
    pub similarity: f32,
}

impl CuriosityMatch {
    /// Whether this is a strong match (> 0.7 similarity).
    pub fn is_strong_match(&self) -> bool {
        self.similarity > STRONG_MATCH
    }

    /// Format the match as a prompt reminding the agent of the question.
    pub fn format_prompt(&self) -> String {
        let strength = if self.is_strong_match() { "strongly" } else { "somewhat" };

        let mut lines = vec![
            format!("# CURIOSITY BRIDGE: This topic {strength} relates to an open question!"),
            format!(
                "# Question (asked {}x): {}",
                self.curiosity.recurrence_count, self.curiosity.question
            ),
        ];
        if let Some(context) = &self.curiosity.context {
            lines.push(format!("# Original context: {context}"));
        }
        lines.push("#".to_string());
        lines.push("# Consider: Is now a good time to explore this curiosity?".to_string());

        lines.join("\n")
    }
}

/// Bridges conversation context to open curiosities.
///
/// Curiosity embeddings are cached in an LRU keyed by curiosity id. The
/// cache is advisory only; [`CuriosityBridge::refresh`] drops it.
pub struct CuriosityBridge {
    agent_id: String,
    project_id: Option<String>,
    match_threshold: f32,
    embedding_cache: LruCache<String, Vec<f32>>,
}

impl CuriosityBridge {
    pub fn new(agent_id: impl Into<String>, project_id: Option<String>) -> Self {
        Self::with_threshold(agent_id, project_id, DEFAULT_MATCH_THRESHOLD)
    }

    pub fn with_threshold(
        agent_id: impl Into<String>,
        project_id: Option<String>,
        match_threshold: f32,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            project_id,
            match_threshold,
            embedding_cache: LruCache::new(
                NonZeroUsize::new(EMBEDDING_CACHE_SIZE).expect("cache size is non-zero"),
            ),
        }
    }

    /// Find open curiosities matching the current topic, best first.
    pub fn find_matching_curiosities(
        &mut self,
        store: &Storage,
        embedder: &dyn TextEmbedder,
        current_topic: &str,
        limit: usize,
    ) -> Result<Vec<CuriosityMatch>, BridgeError> {
        let topic_embedding = embedder.embed(current_topic)?;

        let curiosities = store.get_curiosities(
            &self.agent_id,
            None,
            self.project_id.as_deref(),
            CuriosityStatus::Open,
        )?;

        let mut matches: Vec<CuriosityMatch> = Vec::new();
        for curiosity in curiosities {
            let embedding = match self.embedding_cache.get(&curiosity.id) {
                Some(cached) => cached.clone(),
                None => {
                    // Question plus context makes a richer embedding
                    let text = match &curiosity.context {
                        Some(context) => format!("{} {}", curiosity.question, context),
                        None => curiosity.question.clone(),
                    };
                    let embedding = embedder.embed(&text)?;
                    self.embedding_cache.put(curiosity.id.clone(), embedding.clone());
                    embedding
                }
            };

            let similarity = cosine_similarity(&topic_embedding, &embedding);
            if similarity >= self.match_threshold {
                matches.push(CuriosityMatch { curiosity, similarity });
            }
        }

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);
        Ok(matches)
    }

    /// Drop cached embeddings (after curiosities change).
    pub fn refresh(&mut self) {
        self.embedding_cache.clear();
    }

    /// Check for a match and format the best one as a prompt.
    pub fn check_and_format(
        &mut self,
        store: &Storage,
        embedder: &dyn TextEmbedder,
        current_topic: &str,
    ) -> Result<Option<String>, BridgeError> {
        let matches = self.find_matching_curiosities(store, embedder, current_topic, 1)?;
        Ok(matches.first().map(CuriosityMatch::format_prompt))
    }
}
