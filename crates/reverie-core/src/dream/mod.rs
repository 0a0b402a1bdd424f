//! Dream pipeline
//!
//! Between-session memory processing in three stages, orchestrated by a
//! crash-recoverable FSM:
//!
//! - **N2** consolidation: link discovery and impact adjustment
//! - **N3** deep processing: gists, contradictions, scope validation
//! - **REM** divergent gathering: distant pairs, incomplete thoughts,
//!   themes, diary excerpts, and the dream journal
//!
//! Dreams are divergent, not convergent. They explore, connect, and create.

pub mod fsm;
pub mod n2;
pub mod n3;
pub mod rem;
pub mod types;

pub use fsm::{DREAM_SESSION_RETENTION_DAYS, DreamError, DreamOutcome, DreamRunner};
pub use n2::run_n2_consolidation;
pub use n3::run_n3_processing;
pub use rem::{gather_dream_materials, run_rem_dreaming};
pub use types::{
    Contradiction, DiarySnippet, DiscoveredLink, DreamConfig, DreamMaterials, DreamSession,
    DreamStage, DreamState, GistResult, ImpactAdjustment, IncompleteThought, MemoryPair, N2Result,
    N3Result, RemResult, ScopeIssue,
};
