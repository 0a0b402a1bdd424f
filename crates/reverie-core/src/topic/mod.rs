//! Topic shift detection
//!
//! Tracks the conversation topic across messages and flags significant
//! shifts. A shift is a natural recall trigger: when the subject changes,
//! related memories should surface on their own.

use crate::embeddings::{EmbeddingError, TextEmbedder, cosine_similarity, find_similar};
use crate::memory::Memory;
use crate::storage::Storage;

pub mod curiosity;

pub use curiosity::{CuriosityBridge, CuriosityMatch};

/// Topics less similar than this trigger recall.
pub const DEFAULT_SHIFT_THRESHOLD: f32 = 0.6;

/// Result of topic shift detection.
#[derive(Debug, Clone)]
pub struct TopicShift {
    pub current_topic: String,
    pub current_embedding: Vec<f32>,
    pub previous_topic: Option<String>,
    /// 1.0 = same topic, 0.0 = completely different
    pub similarity: f32,
    pub threshold: f32,
}

impl TopicShift {
    /// Whether the shift is significant enough to trigger recall. The first
    /// message is never a shift.
    pub fn is_significant(&self) -> bool {
        self.previous_topic.is_some() && self.similarity < self.threshold
    }

    /// How far the topic moved (inverse of similarity).
    pub fn shift_magnitude(&self) -> f32 {
        1.0 - self.similarity
    }

    /// Memories related to the new topic, in similarity order.
    pub fn get_related_memories(
        &self,
        store: &Storage,
        agent_id: &str,
        project_id: Option<&str>,
        limit: usize,
        similarity_threshold: f32,
    ) -> crate::storage::Result<Vec<Memory>> {
        let candidates =
            store.get_memories_with_embeddings(agent_id, project_id, None, false)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<(String, Vec<f32>)> = candidates
            .into_iter()
            .map(|m| (m.id, m.embedding))
            .collect();
        let ranked = find_similar(&self.current_embedding, &pairs, limit, similarity_threshold);

        let mut memories = Vec::with_capacity(ranked.len());
        for result in ranked {
            if let Some(memory) = store.get_memory(&result.item)? {
                memories.push(memory);
            }
        }
        Ok(memories)
    }
}

/// Stateful tracker comparing each message against the previous topic.
/// Advisory state only: reset at will, never authoritative.
#[derive(Default)]
pub struct TopicTracker {
    shift_threshold: f32,
    previous_topic: Option<String>,
    previous_embedding: Option<Vec<f32>>,
}

impl TopicTracker {
    pub fn new() -> Self {
        Self {
            shift_threshold: DEFAULT_SHIFT_THRESHOLD,
            previous_topic: None,
            previous_embedding: None,
        }
    }

    pub fn with_threshold(shift_threshold: f32) -> Self {
        Self {
            shift_threshold,
            previous_topic: None,
            previous_embedding: None,
        }
    }

    /// Detect whether `current_text` represents a topic shift, then store
    /// it as the topic for the next comparison.
    pub fn detect_shift(
        &mut self,
        current_text: &str,
        embedder: &dyn TextEmbedder,
    ) -> Result<TopicShift, EmbeddingError> {
        let current_embedding = embedder.embed(current_text)?;

        let similarity = match &self.previous_embedding {
            Some(previous) => cosine_similarity(&current_embedding, previous),
            None => 1.0,
        };

        let shift = TopicShift {
            current_topic: current_text.to_string(),
            current_embedding: current_embedding.clone(),
            previous_topic: self.previous_topic.take(),
            similarity,
            threshold: self.shift_threshold,
        };

        self.previous_topic = Some(current_text.to_string());
        self.previous_embedding = Some(current_embedding);

        Ok(shift)
    }

    /// Clear tracked state.
    pub fn reset(&mut self) {
        self.previous_topic = None;
        self.previous_embedding = None;
    }

    /// Seed the tracker (e.g. with project context at session start)
    /// without producing a shift.
    pub fn set_topic(
        &mut self,
        text: &str,
        embedder: &dyn TextEmbedder,
    ) -> Result<(), EmbeddingError> {
        self.previous_embedding = Some(embedder.embed(text)?);
        self.previous_topic = Some(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::StubEmbedder;

    #[test]
    fn test_first_message_is_not_a_shift() {
        let mut tracker = TopicTracker::new();
        let shift = tracker
            .detect_shift("rust borrow checker lifetimes", &StubEmbedder)
            .unwrap();
        assert!(!shift.is_significant());
        assert_eq!(shift.similarity, 1.0);
        assert!(shift.previous_topic.is_none());
    }

    #[test]
    fn test_same_topic_is_not_significant() {
        let mut tracker = TopicTracker::new();
        tracker
            .detect_shift("rust borrow checker lifetimes ownership", &StubEmbedder)
            .unwrap();
        let shift = tracker
            .detect_shift("rust borrow checker lifetimes ownership", &StubEmbedder)
            .unwrap();
        assert!(!shift.is_significant());
        assert!(shift.similarity > 0.99);
    }

    #[test]
    fn test_distant_topic_is_significant() {
        let mut tracker = TopicTracker::new();
        tracker
            .detect_shift("rust borrow checker lifetimes ownership", &StubEmbedder)
            .unwrap();
        let shift = tracker
            .detect_shift("sourdough bread hydration baking schedule", &StubEmbedder)
            .unwrap();
        assert!(shift.is_significant());
        assert!(shift.shift_magnitude() > 0.4);
        assert_eq!(
            shift.previous_topic.as_deref(),
            Some("rust borrow checker lifetimes ownership")
        );
    }

    #[test]
    fn test_reset_clears_state() {
        let mut tracker = TopicTracker::new();
        tracker.detect_shift("first topic text", &StubEmbedder).unwrap();
        tracker.reset();
        let shift = tracker
            .detect_shift("completely unrelated subject matter", &StubEmbedder)
            .unwrap();
        assert!(!shift.is_significant());
    }

    #[test]
    fn test_set_topic_seeds_without_shift() {
        let mut tracker = TopicTracker::new();
        tracker
            .set_topic("database schema migration plans", &StubEmbedder)
            .unwrap();
        let shift = tracker
            .detect_shift("database schema migration plans", &StubEmbedder)
            .unwrap();
        assert!(shift.similarity > 0.99);
        assert!(shift.previous_topic.is_some());
    }
}
