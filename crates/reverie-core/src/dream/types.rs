//! Dream pipeline type definitions
//!
//! Configuration and per-stage result records. Stage results serialize to
//! JSON for checkpointing on the `dream_sessions` row, so an interrupted
//! dream can resume with completed stages intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// STAGES & FSM STATES
// ============================================================================

/// Sleep stages for dream processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DreamStage {
    /// Memory consolidation - systematic housekeeping
    N2,
    /// Deep processing - analytical, reductive
    N3,
    /// Divergent material gathering - wandering, associative
    Rem,
}

impl DreamStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DreamStage::N2 => "N2",
            DreamStage::N3 => "N3",
            DreamStage::Rem => "REM",
        }
    }
}

impl std::fmt::Display for DreamStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// FSM states for crash recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DreamState {
    /// No stage has started
    Idle,
    N2Running,
    N2Complete,
    N3Running,
    N3Complete,
    RemRunning,
    /// All stages done
    Complete,
}

impl DreamState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DreamState::Idle => "IDLE",
            DreamState::N2Running => "N2_RUNNING",
            DreamState::N2Complete => "N2_COMPLETE",
            DreamState::N3Running => "N3_RUNNING",
            DreamState::N3Complete => "N3_COMPLETE",
            DreamState::RemRunning => "REM_RUNNING",
            DreamState::Complete => "COMPLETE",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "IDLE" => Some(DreamState::Idle),
            "N2_RUNNING" => Some(DreamState::N2Running),
            "N2_COMPLETE" => Some(DreamState::N2Complete),
            "N3_RUNNING" => Some(DreamState::N3Running),
            "N3_COMPLETE" => Some(DreamState::N3Complete),
            "REM_RUNNING" => Some(DreamState::RemRunning),
            "COMPLETE" => Some(DreamState::Complete),
            _ => None,
        }
    }

    /// Whether a session in this state is still in flight.
    pub fn is_incomplete(&self) -> bool {
        !matches!(self, DreamState::Idle | DreamState::Complete)
    }

    /// Stages that still need to run to finish a dream from this state.
    /// A `*_RUNNING` state re-runs its stage (it never checkpointed).
    pub fn remaining_stages(&self) -> Vec<DreamStage> {
        match self {
            DreamState::Idle | DreamState::N2Running => {
                vec![DreamStage::N2, DreamStage::N3, DreamStage::Rem]
            }
            DreamState::N2Complete | DreamState::N3Running => {
                vec![DreamStage::N3, DreamStage::Rem]
            }
            DreamState::N3Complete | DreamState::RemRunning => vec![DreamStage::Rem],
            DreamState::Complete => vec![],
        }
    }
}

impl std::fmt::Display for DreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CONFIG
// ============================================================================

/// Configuration for dream execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DreamConfig {
    /// Which stages to run, in order
    pub stages: Vec<DreamStage>,

    // N2
    /// Higher than the linker default (0.5) to reduce noise
    pub n2_similarity_threshold: f32,
    /// Max new links per memory
    pub n2_max_links_per_memory: usize,
    /// Max memories to process per run
    pub n2_process_limit: usize,

    // N3
    /// Target gist length in tokens
    pub n3_gist_max_tokens: usize,
    /// High similarity required before a contradiction check
    pub n3_contradiction_threshold: f32,

    // REM
    /// Pairs below this similarity count as "distant"
    pub rem_association_distance: f32,
    /// Bounded wandering
    pub rem_max_iterations: usize,

    // General
    /// Process memories from the last N days
    pub project_lookback_days: i64,
    /// Process diary entries from the last N days
    pub diary_lookback_days: i64,
    pub include_agent_memories: bool,
    pub include_project_memories: bool,
}

impl Default for DreamConfig {
    fn default() -> Self {
        Self {
            stages: vec![DreamStage::N2, DreamStage::N3, DreamStage::Rem],
            n2_similarity_threshold: 0.6,
            n2_max_links_per_memory: 3,
            n2_process_limit: 100,
            n3_gist_max_tokens: 50,
            n3_contradiction_threshold: 0.7,
            rem_association_distance: 0.3,
            rem_max_iterations: 5,
            project_lookback_days: 7,
            diary_lookback_days: 7,
            include_agent_memories: true,
            include_project_memories: true,
        }
    }
}

// ============================================================================
// N2 RESULTS
// ============================================================================

/// A link discovered during N2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredLink {
    pub source_id: String,
    pub target_id: String,
    pub link_type: String,
    pub similarity: f32,
}

/// An impact promotion suggested by link topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactAdjustment {
    pub memory_id: String,
    pub old_impact: String,
    pub new_impact: String,
}

/// Results from the N2 consolidation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct N2Result {
    pub new_links_found: usize,
    pub links: Vec<DiscoveredLink>,
    pub impact_adjustments: Vec<ImpactAdjustment>,
    pub duration_seconds: f64,
    pub memories_processed: usize,
}

impl N2Result {
    /// One-line stage summary.
    pub fn summary(&self) -> String {
        format!(
            "N2: {} new links, {} impact adjustments ({:.1}s)",
            self.new_links_found,
            self.impact_adjustments.len(),
            self.duration_seconds
        )
    }
}

// ============================================================================
// N3 RESULTS
// ============================================================================

/// Result of gist extraction for one memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GistResult {
    pub memory_id: String,
    pub original_length: usize,
    pub gist: String,
    pub gist_length: usize,
}

impl GistResult {
    /// Fraction of the original retained (lower = more compression).
    pub fn compression_ratio(&self) -> f64 {
        if self.original_length == 0 {
            return 1.0;
        }
        self.gist_length as f64 / self.original_length as f64
    }
}

/// A detected contradiction between two memories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    pub memory_id_a: String,
    pub memory_id_b: String,
    pub content_a: String,
    pub content_b: String,
    pub description: String,
    /// Paradoxically high for contradictions
    pub similarity: f32,
}

/// A memory that looks mis-assigned to its region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeIssue {
    pub memory_id: String,
    pub content: String,
    pub current_region: String,
    pub current_project_id: Option<String>,
    pub suggested_region: String,
    pub suggested_project_id: Option<String>,
    pub reason: String,
}

/// Results from the N3 deep-processing stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct N3Result {
    pub gists_created: usize,
    pub gist_results: Vec<GistResult>,
    pub contradictions_found: usize,
    pub contradictions: Vec<Contradiction>,
    pub scope_issues_found: usize,
    pub scope_issues: Vec<ScopeIssue>,
    pub memories_validated: usize,
    pub dissonance_queue_additions: usize,
    pub duration_seconds: f64,
    pub memories_processed: usize,
}

impl N3Result {
    /// One-line stage summary.
    pub fn summary(&self) -> String {
        format!(
            "N3: {} gists, {} contradictions, {} scope issues ({:.1}s)",
            self.gists_created,
            self.contradictions_found,
            self.scope_issues_found,
            self.duration_seconds
        )
    }
}

// ============================================================================
// REM RESULTS
// ============================================================================

/// A pair of semantically distant memories worth connecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPair {
    pub memory_a_id: String,
    pub memory_a_content: String,
    pub memory_b_id: String,
    pub memory_b_content: String,
    /// Low = more distant, more interesting
    pub similarity: f32,
}

/// An unfinished thought found in memory content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncompleteThought {
    pub memory_id: String,
    pub snippet: String,
    /// "wonder", "todo", "unclear", ...
    pub signal_type: String,
}

/// A dated diary excerpt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiarySnippet {
    pub date: String,
    pub excerpt: String,
}

/// Raw materials gathered for reflection. The engine only gathers; the
/// actual dream reflection happens conversationally, outside the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DreamMaterials {
    pub distant_pairs: Vec<MemoryPair>,
    pub incomplete_thoughts: Vec<IncompleteThought>,
    pub recurring_themes: Vec<String>,
    pub diary_snippets: Vec<DiarySnippet>,
    pub total_memories: usize,
    pub total_diary_entries: usize,
    /// New since the last dream
    pub recent_memories_count: usize,
    /// Random older memories mixed in
    pub random_old_memories_count: usize,
    pub recent_diaries_count: usize,
    pub random_old_diaries_count: usize,
}

/// Results from the REM gathering stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemResult {
    pub materials: DreamMaterials,
    /// Path of the generated dream journal, when one was written
    pub dream_journal_path: Option<String>,
    pub duration_seconds: f64,
}

impl RemResult {
    /// One-line stage summary.
    pub fn summary(&self) -> String {
        format!(
            "REM: {} distant pairs, {} incomplete thoughts, {} themes ({:.1}s)",
            self.materials.distant_pairs.len(),
            self.materials.incomplete_thoughts.len(),
            self.materials.recurring_themes.len(),
            self.duration_seconds
        )
    }
}

// ============================================================================
// DREAM SESSION
// ============================================================================

/// Persisted FSM instance for crash recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DreamSession {
    pub id: String,
    pub agent_id: String,
    pub project_id: Option<String>,
    pub state: DreamState,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub n2_result_json: Option<String>,
    pub n3_result_json: Option<String>,
    pub rem_result_json: Option<String>,
}

// ============================================================================
// TESTS
// ============================================================================
