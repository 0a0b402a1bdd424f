//! Auto-linking for the memory graph
//!
//! Finds semantically similar memories (RELATES_TO) and directional
//! evolutionary candidates (BUILDS_ON). The distinction matters for recall:
//! "what clusters together?" vs "how did my thinking evolve?".

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::embeddings::cosine_similarity;
use crate::memory::{EmbeddedMemory, TemporalMemory};

use super::LinkKind;

/// Default minimum similarity for linking.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

/// Default cap on RELATES_TO links per memory.
pub const DEFAULT_MAX_LINKS: usize = 10;

/// Default BUILDS_ON candidate window in hours. Backfill widens this to a
/// week (168) for retroactive detection.
pub const DEFAULT_TIME_WINDOW_HOURS: i64 = 48;

/// Default cap on BUILDS_ON candidates per memory.
pub const DEFAULT_MAX_BUILDS_ON: usize = 3;

/// Confidence at or above which a persisted candidate becomes BUILDS_ON
/// rather than RELATES_TO.
pub const BUILDS_ON_CONFIDENCE: f32 = 0.5;

/// Minimum confidence for a BUILDS_ON candidate to be kept at all.
const MIN_CANDIDATE_CONFIDENCE: f32 = 0.3;

/// Patterns suggesting one memory builds on an earlier thought.
static BUILDS_ON_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Direct reference patterns
        r"(?i)\bas (?:I|we) (?:mentioned|discussed|noted|observed|said)",
        r"(?i)\bbuilding on\b",
        r"(?i)\bfollowing up on\b",
        r"(?i)\bextending\b.*\b(?:earlier|previous)",
        r"(?i)\b(?:as|per) (?:our|the) (?:earlier|previous|last) (?:discussion|conversation|session)",
        // Update/evolution markers
        r"(?i)^(?:Update|Correction|Evolution|Revision|Addendum):",
        r"(?i)\bupdate(?:d|ing)?\b.*\b(?:earlier|previous|my)\b",
        r"(?i)\b(?:now|actually)\b.*\brealiz(?:e|ed)\b",
        r"(?i)\bon (?:second|further) thought\b",
        // Continuation markers
        r"(?i)\bcontinuing\b.*\bthought",
        r"(?i)\b(?:furthermore|moreover|additionally)\b",
        r"(?i)\bthis (?:builds|extends|adds) (?:on|to)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("builds-on pattern compiles"))
    .collect()
});

/// Check if content contains a pattern suggesting it builds on earlier
/// thoughts.
pub fn has_builds_on_pattern(content: &str) -> bool {
    BUILDS_ON_PATTERNS.iter().any(|p| p.is_match(content))
}

// ============================================================================
// RELATES_TO CANDIDATES
// ============================================================================

/// A potential link candidate with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkCandidate {
    pub memory_id: String,
    pub content: String,
    pub similarity: f32,
}

/// Find memories that should be RELATES_TO-linked to a source memory.
///
/// Candidates at or above `threshold` are returned best-first, capped at
/// `max_links`, with `exclude_ids` (typically the source itself) skipped.
pub fn find_link_candidates(
    source_embedding: &[f32],
    candidate_memories: &[EmbeddedMemory],
    threshold: f32,
    max_links: usize,
    exclude_ids: &HashSet<String>,
) -> Vec<LinkCandidate> {
    let mut candidates: Vec<LinkCandidate> = candidate_memories
        .iter()
        .filter(|m| !exclude_ids.contains(&m.id))
        .filter_map(|m| {
            let similarity = cosine_similarity(source_embedding, &m.embedding);
            (similarity >= threshold).then(|| LinkCandidate {
                memory_id: m.id.clone(),
                content: m.content.clone(),
                similarity,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(max_links);
    candidates
}

// ============================================================================
// BUILDS_ON CANDIDATES
// ============================================================================

/// A candidate for a BUILDS_ON relationship, with a detection confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildsOnCandidate {
    pub memory_id: String,
    pub content: String,
    pub similarity: f32,
    pub created_at: DateTime<Utc>,
    pub session_id: Option<String>,
    pub confidence: f32,
}

impl BuildsOnCandidate {
    /// The link kind this candidate should be persisted as.
    pub fn link_kind(&self) -> LinkKind {
        if self.confidence >= BUILDS_ON_CONFIDENCE {
            LinkKind::BuildsOn
        } else {
            LinkKind::RelatesTo
        }
    }
}

/// Find memories the source likely BUILDS_ON.
///
/// Unlike RELATES_TO (symmetric), BUILDS_ON is directional: the target must
/// be strictly older than the source. Detection signals are additive:
/// - within 24 h: +0.3; 24-48 h: +0.15
/// - same session: +0.4
/// - reference pattern in the source content: +0.5
/// - similarity above threshold: (similarity - threshold) * 2
///
/// Candidates below 0.3 confidence are discarded; the rest are returned
/// highest-confidence first, capped at `max_candidates`.
pub fn find_builds_on_candidates(
    source_content: &str,
    source_embedding: &[f32],
    source_session_id: Option<&str>,
    source_created: DateTime<Utc>,
    candidate_memories: &[TemporalMemory],
    similarity_threshold: f32,
    time_window_hours: i64,
    max_candidates: usize,
) -> Vec<BuildsOnCandidate> {
    let time_window = Duration::hours(time_window_hours);
    let has_reference = has_builds_on_pattern(source_content);

    let mut candidates: Vec<BuildsOnCandidate> = Vec::new();

    for candidate in candidate_memories {
        // Can't build on the future
        if candidate.created_at >= source_created {
            continue;
        }
        if source_created - candidate.created_at > time_window {
            continue;
        }

        let similarity = cosine_similarity(source_embedding, &candidate.embedding);
        if similarity < similarity_threshold {
            continue;
        }

        let mut confidence = 0.0_f32;

        let hours_apart =
            (source_created - candidate.created_at).num_seconds() as f32 / 3600.0;
        if hours_apart <= 24.0 {
            confidence += 0.3;
        } else if hours_apart <= 48.0 {
            confidence += 0.15;
        }

        let same_session = match (source_session_id, candidate.session_id.as_deref()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        if same_session {
            confidence += 0.4;
        }

        if has_reference {
            confidence += 0.5;
        }

        confidence += ((similarity - similarity_threshold) * 2.0).max(0.0);

        if confidence >= MIN_CANDIDATE_CONFIDENCE {
            candidates.push(BuildsOnCandidate {
                memory_id: candidate.id.clone(),
                content: candidate.content.clone(),
                similarity,
                created_at: candidate.created_at,
                session_id: candidate.session_id.clone(),
                confidence,
            });
        }
    }

    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(max_candidates);
    candidates
}

/// Suggest a link kind from content and temporal signals.
///
/// BUILDS_ON when the source carries a reference pattern, when both sides
/// share a session with similarity >= 0.6, or when the source is newer with
/// similarity >= 0.7. Otherwise RELATES_TO.
pub fn suggest_link_type(
    source_content: &str,
    similarity: f32,
    source_created: Option<DateTime<Utc>>,
    target_created: Option<DateTime<Utc>>,
    same_session: bool,
) -> LinkKind {
    if has_builds_on_pattern(source_content) {
        return LinkKind::BuildsOn;
    }

    if same_session && similarity >= 0.6 {
        return LinkKind::BuildsOn;
    }

    if let (Some(source), Some(target)) = (source_created, target_created) {
        if source > target && similarity >= 0.7 {
            return LinkKind::BuildsOn;
        }
    }

    LinkKind::RelatesTo
}

// ============================================================================
// TESTS
// ============================================================================
