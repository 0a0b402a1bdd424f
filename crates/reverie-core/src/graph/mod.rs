//! Memory link graph
//!
//! Memories form a bidirectional graph with typed edges. Two topologies
//! matter for recall:
//! - RELATES_TO: semantic similarity (cluster/web)
//! - BUILDS_ON: directional evolution (tree/chain; source builds on the
//!   older target)
//!
//! Edge uniqueness is on the ordered (source, target) pair; re-saving
//! overwrites kind and similarity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod linker;
pub mod traverser;

/// Kinds of links between memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkKind {
    /// General semantic similarity
    RelatesTo,
    /// This memory extends an older one
    BuildsOn,
    /// Conflicting information
    Contradicts,
    /// Newer version of an old memory
    Supersedes,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::RelatesTo => "RELATES_TO",
            LinkKind::BuildsOn => "BUILDS_ON",
            LinkKind::Contradicts => "CONTRADICTS",
            LinkKind::Supersedes => "SUPERSEDES",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "RELATES_TO" => Some(LinkKind::RelatesTo),
            "BUILDS_ON" => Some(LinkKind::BuildsOn),
            "CONTRADICTS" => Some(LinkKind::Contradicts),
            "SUPERSEDES" => Some(LinkKind::Supersedes),
            _ => None,
        }
    }
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed edge between two memories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryLink {
    pub source_id: String,
    pub target_id: String,
    pub kind: LinkKind,
    pub similarity: Option<f32>,
    pub created_at: DateTime<Utc>,
}

impl MemoryLink {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        kind: LinkKind,
        similarity: Option<f32>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            kind,
            similarity,
            created_at: Utc::now(),
        }
    }

    /// The id at the other end of this edge, treating it as undirected.
    pub fn other_end(&self, memory_id: &str) -> &str {
        if self.source_id == memory_id {
            &self.target_id
        } else {
            &self.source_id
        }
    }
}
