//! Memory records - the fundamental units of long-term memory
//!
//! Each memory belongs to an agent, lives in a region (cross-project or
//! project-scoped), carries a kind and an impact level, and records the
//! session/git context it was created in. Records handed to callers are
//! immutable snapshots; all mutation goes through explicit store operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod decay;
pub mod signing;
pub mod tier;

// ============================================================================
// ENUMS
// ============================================================================

/// Memory region - where a memory applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Region {
    /// Cross-project memories for this agent
    Agent,
    /// Project-specific memories
    Project,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Agent => "AGENT",
            Region::Project => "PROJECT",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "AGENT" => Some(Region::Agent),
            "PROJECT" => Some(Region::Project),
            _ => None,
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Semantic category of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryKind {
    /// Relationship patterns, communication style
    Emotional,
    /// Technical foundations, patterns, rules
    Architectural,
    /// Lessons learned, errors to avoid
    Learnings,
    /// Completed work, milestones
    Achievements,
    /// Cross-platform self-observations
    Introspect,
    /// Insights from dream processing
    Dream,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Emotional => "EMOTIONAL",
            MemoryKind::Architectural => "ARCHITECTURAL",
            MemoryKind::Learnings => "LEARNINGS",
            MemoryKind::Achievements => "ACHIEVEMENTS",
            MemoryKind::Introspect => "INTROSPECT",
            MemoryKind::Dream => "DREAM",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "EMOTIONAL" => Some(MemoryKind::Emotional),
            "ARCHITECTURAL" => Some(MemoryKind::Architectural),
            "LEARNINGS" => Some(MemoryKind::Learnings),
            "ACHIEVEMENTS" => Some(MemoryKind::Achievements),
            "INTROSPECT" => Some(MemoryKind::Introspect),
            "DREAM" => Some(MemoryKind::Dream),
            _ => None,
        }
    }

    /// Short tag used in the emitted DSL lines.
    pub fn dsl_tag(&self) -> &'static str {
        match self {
            MemoryKind::Emotional => "EMOT",
            MemoryKind::Architectural => "ARCH",
            MemoryKind::Learnings => "LEARN",
            MemoryKind::Achievements => "ACHV",
            MemoryKind::Introspect => "INTRO",
            MemoryKind::Dream => "DREAM",
        }
    }

    /// Injection ordering: EMOTIONAL first (it shapes interaction style),
    /// then self-observation, then the technical kinds.
    pub fn injection_order(&self) -> u8 {
        match self {
            MemoryKind::Emotional => 0,
            MemoryKind::Introspect => 1,
            MemoryKind::Architectural => 2,
            MemoryKind::Learnings => 3,
            MemoryKind::Achievements => 4,
            MemoryKind::Dream => 5,
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Impact level - drives injection priority and decay rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Impact {
    /// Transient post-compact recovery record; always injected first
    Wip,
    /// Aggressive decay after 1 day
    Low,
    /// Moderate decay after 1 week
    Medium,
    /// Gentle decay after 1 month
    High,
    /// Never decays, keeps full detail
    Critical,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Wip => "WIP",
            Impact::Low => "LOW",
            Impact::Medium => "MEDIUM",
            Impact::High => "HIGH",
            Impact::Critical => "CRITICAL",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "WIP" => Some(Impact::Wip),
            "LOW" => Some(Impact::Low),
            "MEDIUM" => Some(Impact::Medium),
            "HIGH" => Some(Impact::High),
            "CRITICAL" => Some(Impact::Critical),
            _ => None,
        }
    }

    /// Short tag used in the emitted DSL lines.
    pub fn dsl_tag(&self) -> &'static str {
        match self {
            Impact::Wip => "WIP",
            Impact::Low => "LOW",
            Impact::Medium => "MED",
            Impact::High => "HIGH",
            Impact::Critical => "CRIT",
        }
    }

    /// Injection ordering key. WIP is strictly first - it signals
    /// post-compact state and triggers deferred loading.
    pub fn injection_order(&self) -> i8 {
        match self {
            Impact::Wip => -1,
            Impact::Critical => 0,
            Impact::High => 1,
            Impact::Medium => 2,
            Impact::Low => 3,
        }
    }
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Loading tier for session-start injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryTier {
    /// Always loaded: CRITICAL emotional memories
    Core,
    /// Recently accessed memories
    Active,
    /// Recent or high-impact, loaded by default
    Contextual,
    /// Rarely accessed, loaded on-demand via semantic search
    Deep,
}

impl MemoryTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryTier::Core => "CORE",
            MemoryTier::Active => "ACTIVE",
            MemoryTier::Contextual => "CONTEXTUAL",
            MemoryTier::Deep => "DEEP",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "CORE" => Some(MemoryTier::Core),
            "ACTIVE" => Some(MemoryTier::Active),
            "CONTEXTUAL" => Some(MemoryTier::Contextual),
            "DEEP" => Some(MemoryTier::Deep),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// AGENT / PROJECT
// ============================================================================

/// A memory-owning persona. Created once per logical agent, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// HMAC key for integrity signatures (optional)
    pub signing_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            signing_key: None,
            created_at: Utc::now(),
        }
    }

    /// Whether memories created by this agent should be signed.
    pub fn should_sign(&self) -> bool {
        self.signing_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// A scoping context, typically a code repository. Paths are unique:
/// saving a project whose path already exists reconciles to the existing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Canonical filesystem path (unique)
    pub path: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// MEMORY
// ============================================================================

/// The central record.
///
/// `content` may be gist-compressed over time; `original_content` is the
/// immutable text at creation. On upsert, only the mutable fields are
/// written back (content, confidence, last_accessed, version, superseded_by,
/// signature, token_count, platform, session_id, git_commit, git_branch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub agent_id: String,
    pub region: Region,
    /// Required iff region = PROJECT
    pub project_id: Option<String>,
    pub kind: MemoryKind,
    pub content: String,
    pub original_content: String,
    pub impact: Impact,
    /// In [0.0, 1.0]
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    /// Predecessor in this kind's chain
    pub previous_memory_id: Option<String>,
    pub version: i64,
    pub superseded_by: Option<String>,
    /// Base64 HMAC over canonical fields
    pub signature: Option<String>,
    /// Cached cost of injecting this memory
    pub token_count: Option<i64>,
    /// Source agent variant (e.g. distinct host LLM)
    pub platform: Option<String>,
    pub session_id: Option<String>,
    pub git_commit: Option<String>,
    pub git_branch: Option<String>,
    pub tier: MemoryTier,
    /// Set at load time when the owning agent has a signing key.
    /// Not persisted - the DSL emitter marks untrusted records with it.
    #[serde(skip)]
    pub signature_valid: Option<bool>,
}

impl Memory {
    /// Create a new memory with a fresh id and current timestamps.
    pub fn new(
        agent_id: impl Into<String>,
        region: Region,
        project_id: Option<String>,
        kind: MemoryKind,
        content: impl Into<String>,
        impact: Impact,
    ) -> Self {
        let now = Utc::now();
        let content = content.into();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            region,
            project_id,
            kind,
            original_content: content.clone(),
            content,
            impact,
            confidence: 1.0,
            created_at: now,
            last_accessed: now,
            previous_memory_id: None,
            version: 1,
            superseded_by: None,
            signature: None,
            token_count: None,
            platform: None,
            session_id: None,
            git_commit: None,
            git_branch: None,
            tier: MemoryTier::Contextual,
            signature_valid: None,
        }
    }

    /// Update the access timestamp. Callers re-persist via the store.
    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
    }

    pub fn is_superseded(&self) -> bool {
        self.superseded_by.is_some()
    }
}

// ============================================================================
// QUERY RECORDS
// ============================================================================

/// A memory id/content pair with its embedding, as returned by
/// `Storage::get_memories_with_embeddings`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedMemory {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// A memory with embedding plus the temporal context needed for BUILDS_ON
/// detection, as returned by `Storage::get_memories_with_temporal_context`.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalMemory {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub session_id: Option<String>,
}

// ============================================================================
// TESTS
// ============================================================================
