//! # Reverie Core
//!
//! Long-term memory engine for conversational agents. An agent has no
//! continuity between sessions; Reverie persists, ranks, links, decays, and
//! re-injects structured memory records so that it appears to remember.
//!
//! - **Memory store & graph**: typed records with rich metadata, semantic
//!   embeddings, a bidirectional link graph (RELATES_TO, BUILDS_ON,
//!   CONTRADICTS, SUPERSEDES), and a tier classifier deciding what is
//!   always hot vs on-demand.
//! - **Injection pipeline**: at session start, a budget-bounded, prioritized
//!   subset of memories is selected by tier, recency, project-fingerprint
//!   similarity, and previous-session continuity, then emitted as a compact
//!   `[LTM:...]` block.
//! - **Dream pipeline**: an offline, resumable three-stage FSM (N2
//!   consolidation, N3 deep processing, REM divergent gathering) that
//!   discovers links, adjusts importance, extracts gists, flags
//!   contradictions and scope issues, and assembles dream materials.
//! - **Temporal layer**: "yesterday", "last session", "during the last
//!   commit" become spatial query coordinates against the store.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use reverie_core::prelude::*;
//!
//! let store = Storage::open_default()?;
//! let agent = Agent::new("anima", "Anima");
//!
//! // Save a memory; metadata is inferred from the text
//! let outcome = remember(
//!     &store,
//!     Some(&LocalEmbedder::new()),
//!     &agent,
//!     None,
//!     None,
//!     RememberRequest::new("This is crucial: never use print for logging"),
//! )?;
//!
//! // At session start, inject the prioritized memory set
//! let injector = MemoryInjector::new(&EngineConfig::default());
//! let result = injector.inject(&store, &agent, None, None, None)?;
//! println!("{}", result.dsl);
//! ```
//!
//! ## Feature flags
//!
//! - `embeddings` (default): local embedding generation with fastembed
//!   (bge-small-en-v1.5, 384 dimensions)
//! - `bundled-sqlite` (default): bundle SQLite into the binary

// ============================================================================
// MODULES
// ============================================================================

pub mod backfill;
pub mod config;
pub mod diary;
pub mod dream;
pub mod embeddings;
pub mod graph;
pub mod injection;
pub mod integrity;
pub mod memory;
pub mod project;
pub mod remember;
pub mod session;
pub mod storage;
pub mod topic;

mod text;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Memory types
pub use memory::{
    Agent, EmbeddedMemory, Impact, Memory, MemoryKind, MemoryTier, Project, Region,
    TemporalMemory,
    decay::{DecayEngine, DecayOutcome},
    signing::{should_verify, sign_memory, verify_signature},
    tier::classify_tier,
};

// Storage layer
pub use storage::{
    Curiosity, CuriosityStatus, Dissonance, DissonanceKind, DissonanceStatus, MemoryLimits,
    Result, SCHEMA_VERSION, Storage, StorageError,
};

// Link graph
pub use graph::{
    LinkKind, MemoryLink,
    linker::{
        BuildsOnCandidate, LinkCandidate, find_builds_on_candidates, find_link_candidates,
        has_builds_on_pattern, suggest_link_type,
    },
    traverser::{LinkedMemory, get_linked_memories, get_memory_chain},
};

// Embeddings
pub use embeddings::{
    EMBEDDING_DIMENSIONS, Embedding, EmbeddingError, SimilarityResult, StubEmbedder,
    TextEmbedder, cosine_similarity, find_similar,
};

#[cfg(feature = "embeddings")]
pub use embeddings::LocalEmbedder;

// Sessions & temporal queries
pub use session::{
    generate_session_id, get_current_session_id, get_previous_session_id, start_session,
    git::{CommitInfo, GitContext, get_git_context, get_recent_commits},
    temporal::{
        TemporalContext, TemporalCoordinate, TemporalCueType, find_all_temporal_cues,
        parse_temporal_cue,
    },
};

// Project fingerprinting
pub use project::{PROJECT_MEMORY_THRESHOLD, ProjectFingerprint};

// Injection
pub use injection::{
    InjectionResult, InjectionStats, MemoryBlock, MemoryInjector, calculate_token_count,
    count_tokens, ensure_token_count, estimate_tokens, memory_line, truncate_content,
};

// Memory creation
pub use remember::{RememberOutcome, RememberRequest, remember};

// Backfill
pub use backfill::{
    BackfillError, BackfillOutcome, run_builds_on_backfill, run_embedding_backfill,
};

// Topic & curiosity bridges
pub use topic::{CuriosityBridge, CuriosityMatch, TopicShift, TopicTracker};

// Dream pipeline
pub use dream::{
    Contradiction, DreamConfig, DreamError, DreamMaterials, DreamOutcome, DreamRunner,
    DreamSession, DreamStage, DreamState, GistResult, N2Result, N3Result, RemResult, ScopeIssue,
};

// Diary
pub use diary::DiaryStore;

// Integrity
pub use integrity::{IntegrityChecker, IntegrityIssue, IntegrityReport, Severity};

// Configuration
pub use config::{BudgetConfig, EngineConfig, HookConfig, LoggingConfig};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-small-en-v1.5";

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        Agent, DiaryStore, DreamConfig, DreamRunner, EngineConfig, Impact, InjectionResult,
        IntegrityChecker, Memory, MemoryInjector, MemoryKind, MemoryLimits, MemoryTier, Project,
        Region, RememberRequest, Result, Storage, StorageError, remember, start_session,
    };

    pub use crate::{StubEmbedder, TextEmbedder};

    #[cfg(feature = "embeddings")]
    pub use crate::LocalEmbedder;
}
