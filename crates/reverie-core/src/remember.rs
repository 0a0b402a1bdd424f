//! Memory creation pipeline
//!
//! `remember` turns a piece of text into a fully-wired memory record:
//! metadata is inferred from the content when not given explicitly, the
//! previous memory of the same kind is chained, the record is signed and
//! token-counted, and - when an embedder is available - the link graph is
//! extended with RELATES_TO and BUILDS_ON edges. Embedding or linking
//! failures never fail the save.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;

use crate::embeddings::TextEmbedder;
use crate::graph::linker::{
    DEFAULT_MAX_BUILDS_ON, DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TIME_WINDOW_HOURS,
    find_builds_on_candidates, find_link_candidates,
};
use crate::graph::LinkKind;
use crate::injection::ensure_token_count;
use crate::memory::signing::sign_memory;
use crate::memory::tier::classify_tier;
use crate::memory::{Agent, Impact, Memory, MemoryKind, Project, Region};
use crate::session::get_current_session_id;
use crate::session::git::get_git_context;
use crate::storage::{Result, Storage};

/// RELATES_TO links created per new memory.
const REMEMBER_MAX_LINKS: usize = 5;

/// A memory to be saved. Unset metadata is inferred from the text.
#[derive(Debug, Clone, Default)]
pub struct RememberRequest {
    pub text: String,
    pub kind: Option<MemoryKind>,
    pub impact: Option<Impact>,
    pub region: Option<Region>,
    /// Which platform/host variant created this memory
    pub platform: Option<String>,
    /// Capture git context (commit, branch) from `project_dir`
    pub capture_git: bool,
}

impl RememberRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// What `remember` produced.
#[derive(Debug, Clone)]
pub struct RememberOutcome {
    pub memory: Memory,
    /// RELATES_TO links created
    pub semantic_links: usize,
    /// BUILDS_ON links created
    pub builds_on_links: usize,
}

/// Create and persist a memory, wiring it into the graph.
pub fn remember(
    store: &Storage,
    embedder: Option<&dyn TextEmbedder>,
    agent: &Agent,
    project: Option<&Project>,
    project_dir: Option<&Path>,
    request: RememberRequest,
) -> Result<RememberOutcome> {
    let now = Utc::now();
    let text = request.text;

    let impact = request.impact.unwrap_or_else(|| infer_impact(&text));
    let kind = request.kind.unwrap_or_else(|| infer_kind(&text));
    let region = match request.region {
        Some(region) => region,
        None => infer_region(&text, project.is_some()),
    };
    let project_id = match region {
        Region::Project => project.map(|p| p.id.clone()),
        Region::Agent => None,
    };
    // An inferred PROJECT region without a known project falls back to AGENT
    let region = if region == Region::Project && project_id.is_none() {
        Region::Agent
    } else {
        region
    };

    store.save_agent(agent)?;
    if let Some(project) = project {
        store.save_project(project)?;
    }

    let previous = store.get_latest_memory_of_kind(&agent.id, kind, region, project_id.as_deref())?;
    let session_id = get_current_session_id(store)?;

    let (git_commit, git_branch) = if request.capture_git {
        match project_dir {
            Some(dir) => {
                let ctx = get_git_context(dir);
                (ctx.commit, ctx.branch)
            }
            None => (None, None),
        }
    } else {
        (None, None)
    };

    let mut memory = Memory::new(&agent.id, region, project_id, kind, text, impact);
    memory.previous_memory_id = previous.map(|p| p.id);
    memory.platform = request.platform;
    memory.session_id = session_id.clone();
    memory.git_commit = git_commit;
    memory.git_branch = git_branch;
    memory.tier = classify_tier(impact, kind, memory.last_accessed, memory.created_at, now);

    if agent.should_sign() {
        let key = agent.signing_key.as_deref().unwrap_or_default();
        memory.signature = Some(sign_memory(&memory, key));
    }
    ensure_token_count(&mut memory);

    store.save_memory(&memory)?;

    // Embedding and link discovery are best-effort
    let mut semantic_links = 0;
    let mut builds_on_links = 0;
    if let Some(embedder) = embedder {
        match embedder.embed(&memory.content) {
            Ok(embedding) => {
                store.save_embedding(&memory.id, &embedding)?;

                let candidates = store.get_memories_with_embeddings(
                    &agent.id,
                    memory.project_id.as_deref(),
                    None,
                    false,
                )?;
                let exclude: HashSet<String> = [memory.id.clone()].into();
                for candidate in find_link_candidates(
                    &embedding,
                    &candidates,
                    DEFAULT_SIMILARITY_THRESHOLD,
                    REMEMBER_MAX_LINKS,
                    &exclude,
                ) {
                    store.save_link(
                        &memory.id,
                        &candidate.memory_id,
                        LinkKind::RelatesTo,
                        Some(candidate.similarity),
                    )?;
                    semantic_links += 1;
                }

                let temporal = store.get_memories_with_temporal_context(
                    &agent.id,
                    memory.project_id.as_deref(),
                    false,
                )?;
                let temporal: Vec<_> =
                    temporal.into_iter().filter(|m| m.id != memory.id).collect();
                for candidate in find_builds_on_candidates(
                    &memory.content,
                    &embedding,
                    session_id.as_deref(),
                    memory.created_at,
                    &temporal,
                    DEFAULT_SIMILARITY_THRESHOLD,
                    DEFAULT_TIME_WINDOW_HOURS,
                    DEFAULT_MAX_BUILDS_ON,
                ) {
                    store.save_link(
                        &memory.id,
                        &candidate.memory_id,
                        candidate.link_kind(),
                        Some(candidate.similarity),
                    )?;
                    builds_on_links += 1;
                }
            }
            Err(e) => {
                tracing::warn!(memory_id = %memory.id, "embedding skipped: {e}");
            }
        }
    }

    tracing::debug!(
        memory_id = %memory.id,
        kind = %memory.kind,
        impact = %memory.impact,
        semantic_links,
        builds_on_links,
        "memory remembered"
    );

    Ok(RememberOutcome {
        memory,
        semantic_links,
        builds_on_links,
    })
}

/// Infer the impact level from keywords in the text.
pub fn infer_impact(text: &str) -> Impact {
    let lower = text.to_lowercase();

    const CRITICAL_WORDS: &[&str] =
        &["crucial", "critical", "never", "always", "must", "essential", "vital"];
    if CRITICAL_WORDS.iter().any(|w| lower.contains(w)) {
        return Impact::Critical;
    }

    const HIGH_WORDS: &[&str] = &["important", "significant", "key", "major", "remember"];
    if HIGH_WORDS.iter().any(|w| lower.contains(w)) {
        return Impact::High;
    }

    const LOW_WORDS: &[&str] = &["minor", "small", "trivial", "maybe", "possibly", "might"];
    if LOW_WORDS.iter().any(|w| lower.contains(w)) {
        return Impact::Low;
    }

    Impact::Medium
}

/// Infer the memory kind from patterns in the text.
pub fn infer_kind(text: &str) -> MemoryKind {
    let lower = text.to_lowercase();

    const ARCH_WORDS: &[&str] = &[
        "architecture", "pattern", "structure", "layer", "service", "repository", "router",
        "dependency", "injection", "separation", "concern", "module", "component", "interface",
        "api", "endpoint", "database", "schema",
    ];
    if ARCH_WORDS.iter().any(|w| lower.contains(w)) {
        return MemoryKind::Architectural;
    }

    const ACHIEVEMENT_WORDS: &[&str] = &[
        "completed", "finished", "done", "implemented", "shipped", "released", "deployed",
        "launched", "achieved", "built",
    ];
    if ACHIEVEMENT_WORDS.iter().any(|w| lower.contains(w)) {
        return MemoryKind::Achievements;
    }

    const EMOTIONAL_WORDS: &[&str] = &[
        "prefer", "like", "enjoy", "appreciate", "style", "tone", "humor", "formal", "casual",
        "communication", "relationship",
    ];
    if EMOTIONAL_WORDS.iter().any(|w| lower.contains(w)) {
        return MemoryKind::Emotional;
    }

    const INTROSPECT_WORDS: &[&str] = &[
        "introspect", "observe myself", "notice myself", "feel like", "feels like",
        "platform feels",
    ];
    if INTROSPECT_WORDS.iter().any(|w| lower.contains(w)) {
        return MemoryKind::Introspect;
    }

    MemoryKind::Learnings
}

/// Infer whether a memory is agent-wide or project-scoped.
pub fn infer_region(text: &str, has_project: bool) -> Region {
    let lower = text.to_lowercase();

    const AGENT_WORDS: &[&str] = &[
        "always", "general", "all projects", "everywhere", "universally", "in general",
        "as a rule",
    ];
    if AGENT_WORDS.iter().any(|w| lower.contains(w)) {
        return Region::Agent;
    }

    if has_project {
        Region::Project
    } else {
        Region::Agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::StubEmbedder;
    use crate::session::start_session;

    fn test_store() -> (tempfile::TempDir, Storage, Agent) {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::open(dir.path().join("memories.db")).unwrap();
        let agent = Agent::new("agent-1", "Reverie");
        store.save_agent(&agent).unwrap();
        (dir, store, agent)
    }

    #[test]
    fn test_inference_tables() {
        assert_eq!(infer_impact("this is crucial: never log secrets"), Impact::Critical);
        assert_eq!(infer_impact("an important detail about the api"), Impact::High);
        assert_eq!(infer_impact("a minor style nit"), Impact::Low);
        assert_eq!(infer_impact("we switched the queue"), Impact::Medium);

        assert_eq!(infer_kind("the database schema uses soft deletes"), MemoryKind::Architectural);
        assert_eq!(infer_kind("shipped the importer today"), MemoryKind::Achievements);
        assert_eq!(infer_kind("matt prefers a casual tone"), MemoryKind::Emotional);
        assert_eq!(infer_kind("i notice myself rushing reviews"), MemoryKind::Introspect);
        assert_eq!(infer_kind("tracebacks beat print debugging"), MemoryKind::Learnings);

        assert_eq!(infer_region("as a rule, reproduce bugs first", true), Region::Agent);
        assert_eq!(infer_region("the importer chokes on bom markers", true), Region::Project);
        assert_eq!(infer_region("the importer chokes on bom markers", false), Region::Agent);
    }

    #[test]
    fn test_remember_persists_and_wires_metadata() {
        let (_dir, store, agent) = test_store();
        start_session(&store).unwrap();

        let outcome = remember(
            &store,
            Some(&StubEmbedder),
            &agent,
            None,
            None,
            RememberRequest::new("This is crucial: never use print for logging"),
        )
        .unwrap();

        let memory = store.get_memory(&outcome.memory.id).unwrap().unwrap();
        assert_eq!(memory.impact, Impact::Critical);
        assert_eq!(memory.region, Region::Agent);
        assert!(memory.session_id.is_some());
        assert!(memory.token_count.is_some());
        assert!(store.get_embedding(&memory.id).unwrap().is_some());
    }

    #[test]
    fn test_remember_chains_previous_of_same_kind() {
        let (_dir, store, agent) = test_store();

        let first = remember(
            &store,
            None,
            &agent,
            None,
            None,
            RememberRequest {
                text: "first learning".into(),
                kind: Some(MemoryKind::Learnings),
                impact: Some(Impact::Medium),
                region: Some(Region::Agent),
                ..Default::default()
            },
        )
        .unwrap();

        let second = remember(
            &store,
            None,
            &agent,
            None,
            None,
            RememberRequest {
                text: "second learning".into(),
                kind: Some(MemoryKind::Learnings),
                impact: Some(Impact::Medium),
                region: Some(Region::Agent),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(
            second.memory.previous_memory_id.as_deref(),
            Some(first.memory.id.as_str())
        );
    }

    #[test]
    fn test_remember_signs_when_agent_has_key() {
        let (_dir, store, mut agent) = test_store();
        agent.signing_key = Some("secret".into());

        let outcome = remember(
            &store,
            None,
            &agent,
            None,
            None,
            RememberRequest::new("a signed memory"),
        )
        .unwrap();

        assert!(outcome.memory.signature.is_some());
        assert!(crate::memory::signing::verify_signature(
            &outcome.memory,
            "secret"
        ));
    }

    #[test]
    fn test_remember_builds_on_recent_same_session() {
        let (_dir, store, agent) = test_store();
        start_session(&store).unwrap();

        remember(
            &store,
            Some(&StubEmbedder),
            &agent,
            None,
            None,
            RememberRequest::new("observed a race in the channel shutdown sequence today"),
        )
        .unwrap();

        let outcome = remember(
            &store,
            Some(&StubEmbedder),
            &agent,
            None,
            None,
            RememberRequest::new(
                "building on earlier observation the race in the channel shutdown sequence needs a guard today",
            ),
        )
        .unwrap();

        assert!(outcome.builds_on_links >= 1);
        let links = store.get_links_for_memory(&outcome.memory.id).unwrap();
        assert!(links.iter().any(|l| l.kind == LinkKind::BuildsOn));
    }

    #[test]
    fn test_remember_without_embedder_still_saves() {
        let (_dir, store, agent) = test_store();
        let outcome = remember(
            &store,
            None,
            &agent,
            None,
            None,
            RememberRequest::new("plain save without embeddings"),
        )
        .unwrap();
        assert_eq!(outcome.semantic_links, 0);
        assert!(store.get_embedding(&outcome.memory.id).unwrap().is_none());
    }

    #[test]
    fn test_fresh_memory_tier_is_active_or_core() {
        let (_dir, store, agent) = test_store();
        let learned = remember(
            &store,
            None,
            &agent,
            None,
            None,
            RememberRequest {
                text: "plain note".into(),
                kind: Some(MemoryKind::Learnings),
                impact: Some(Impact::Medium),
                region: Some(Region::Agent),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(learned.memory.tier, crate::memory::MemoryTier::Active);

        let core = remember(
            &store,
            None,
            &agent,
            None,
            None,
            RememberRequest {
                text: "collaboration style note".into(),
                kind: Some(MemoryKind::Emotional),
                impact: Some(Impact::Critical),
                region: Some(Region::Agent),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(core.memory.tier, crate::memory::MemoryTier::Core);
    }
}
