//! Session-start memory injection
//!
//! Assembles a budget-bounded, prioritized memory set and emits the DSL
//! block. Loading order matters:
//!
//! 1. WIP memories (post-compact recovery, bypass tier logic)
//! 2. AGENT-region memories by tier (CORE -> ACTIVE -> CONTEXTUAL)
//! 3. PROJECT-region memories by fingerprint similarity (tier fallback)
//! 4. Previous-session continuity
//!
//! Memories that do not fit the token/byte budget are deferred for lazy
//! loading after the first exchange.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;

use crate::config::EngineConfig;
use crate::embeddings::TextEmbedder;
use crate::memory::signing::{should_verify, verify_signature};
use crate::memory::{Agent, Impact, Memory, MemoryTier, Project, Region};
use crate::project::{PROJECT_MEMORY_THRESHOLD, ProjectFingerprint};
use crate::session::get_previous_session_id;
use crate::storage::{Result, Storage};

pub mod dsl;

pub use dsl::{MemoryBlock, memory_line};

/// Candidate pool size for the semantic project load; the budget filters
/// further.
const SEMANTIC_PROJECT_CANDIDATES: usize = 30;

/// Tiers loaded by default, in order.
const INJECTED_TIERS: [MemoryTier; 3] =
    [MemoryTier::Core, MemoryTier::Active, MemoryTier::Contextual];

static BPE: LazyLock<Option<CoreBPE>> = LazyLock::new(|| tiktoken_rs::cl100k_base().ok());

// ============================================================================
// TOKEN COUNTING
// ============================================================================

/// Accurate token count (cl100k_base), falling back to ~4 chars per token.
pub fn count_tokens(text: &str) -> usize {
    match BPE.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => estimate_tokens(text),
    }
}

/// Fast approximate token count.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Token cost of a memory's DSL line, from the cached count when present.
pub fn memory_tokens(memory: &Memory) -> usize {
    match memory.token_count {
        Some(count) if count >= 0 => count as usize,
        _ => estimate_tokens(&(memory_line(memory) + "\n")),
    }
}

/// Accurate token count for a memory's DSL line. Called on save so the
/// result can be cached in `token_count`.
pub fn calculate_token_count(memory: &Memory) -> i64 {
    count_tokens(&(memory_line(memory) + "\n")) as i64
}

/// Fill `token_count` if not already cached.
pub fn ensure_token_count(memory: &mut Memory) {
    if memory.token_count.is_none() {
        memory.token_count = Some(calculate_token_count(memory));
    }
}

/// Truncate display content to `max_chars`, preferring a sentence boundary.
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }

    let cut: String = content.chars().take(max_chars.saturating_sub(4)).collect();
    if let Some(last_period) = cut.rfind(". ") {
        if last_period > max_chars / 2 {
            return format!("{}...", &cut[..=last_period]);
        }
    }
    format!("{cut}...")
}

// ============================================================================
// RESULTS
// ============================================================================

/// Result of a session-start injection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InjectionResult {
    /// Formatted memory block (empty when nothing was injected)
    pub dsl: String,
    /// Ids of injected memories
    pub injected_ids: Vec<String>,
    /// Ids that did not fit the budget, for lazy loading
    pub deferred_ids: Vec<String>,
    pub deferred_count: usize,
}

/// Memory statistics for an agent/project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionStats {
    pub agent_memories: usize,
    pub project_memories: usize,
    pub total: usize,
    pub budget_tokens: usize,
    pub priority_counts: BTreeMap<String, usize>,
}

// ============================================================================
// INJECTOR
// ============================================================================

/// Assembles and formats memories for session start.
pub struct MemoryInjector {
    budget: usize,
    max_output_bytes: usize,
    max_memory_chars: usize,
}

impl MemoryInjector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            budget: config.budget.memory_budget(),
            max_output_bytes: config.hook.max_output_bytes,
            max_memory_chars: config.hook.max_memory_chars,
        }
    }

    /// Override limits directly (tests, custom hosts).
    pub fn with_limits(budget: usize, max_output_bytes: usize, max_memory_chars: usize) -> Self {
        Self {
            budget,
            max_output_bytes,
            max_memory_chars,
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Run the full injection pipeline.
    ///
    /// `project_dir` + `embedder` enable the semantic project load; without
    /// them PROJECT memories fall back to tier-based loading.
    pub fn inject(
        &self,
        store: &Storage,
        agent: &Agent,
        project: Option<&Project>,
        project_dir: Option<&Path>,
        embedder: Option<&dyn TextEmbedder>,
    ) -> Result<InjectionResult> {
        let mut memories = self.load_tiered_memories(store, agent, project, project_dir, embedder)?;
        if memories.is_empty() {
            return Ok(InjectionResult::default());
        }

        prioritize_memories(&mut memories);

        let mut block = MemoryBlock::new(&agent.name);
        let frame = MemoryBlock::frame(&agent.name);
        let mut current_tokens = estimate_tokens(&frame);
        let mut current_bytes = frame.len();

        let mut injected_ids: Vec<String> = Vec::new();
        let mut deferred_ids: Vec<String> = Vec::new();
        let mut budget_exceeded = false;

        for mut memory in memories {
            if should_verify(&memory, agent.signing_key.as_deref()) {
                let key = agent.signing_key.as_deref().unwrap_or_default();
                memory.signature_valid = Some(verify_signature(&memory, key));
            }

            let mut display = memory.clone();
            display.content = truncate_content(&display.content, self.max_memory_chars);

            let tokens = memory_tokens(&display);
            let line = memory_line(&display) + "\n";
            let bytes = line.len();

            if !budget_exceeded
                && current_tokens + tokens <= self.budget
                && current_bytes + bytes <= self.max_output_bytes
            {
                injected_ids.push(memory.id.clone());
                current_tokens += tokens;
                current_bytes += bytes;
                block.memories.push(display);

                memory.touch();
                store.save_memory(&memory)?;
            } else {
                budget_exceeded = true;
                deferred_ids.push(memory.id.clone());
            }
        }

        let deferred_count = deferred_ids.len();
        tracing::debug!(
            injected = injected_ids.len(),
            deferred = deferred_count,
            tokens = current_tokens,
            "injection assembled"
        );

        Ok(InjectionResult {
            dsl: block.to_dsl(),
            injected_ids,
            deferred_ids,
            deferred_count,
        })
    }

    /// Load memories with the AGENT/PROJECT distinction: AGENT by tier
    /// (recency matters), PROJECT by semantic fingerprint (relevance
    /// matters), then previous-session continuity.
    fn load_tiered_memories(
        &self,
        store: &Storage,
        agent: &Agent,
        project: Option<&Project>,
        project_dir: Option<&Path>,
        embedder: Option<&dyn TextEmbedder>,
    ) -> Result<Vec<Memory>> {
        let mut memories: Vec<Memory> = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let push = |list: Vec<Memory>, memories: &mut Vec<Memory>, seen: &mut HashSet<String>| {
            for memory in list {
                if seen.insert(memory.id.clone()) {
                    memories.push(memory);
                }
            }
        };

        // 0. WIP first - signals post-compact state, bypasses tier logic
        let wip = store.get_memories_by_impact(
            &agent.id,
            Impact::Wip,
            project.map(|p| p.id.as_str()),
        )?;
        push(wip, &mut memories, &mut seen_ids);

        // 1. AGENT-scoped memories by tier
        for tier in INJECTED_TIERS {
            let tiered =
                store.get_memories_by_tier(&agent.id, &[tier], Some(Region::Agent), None)?;
            push(tiered, &mut memories, &mut seen_ids);
        }

        // 2. PROJECT-scoped memories, semantically when possible
        if let Some(project) = project {
            let semantic = match (project_dir, embedder) {
                (Some(dir), Some(embedder)) => {
                    self.load_semantic_project_memories(store, agent, project, dir, embedder)
                }
                _ => None,
            };

            match semantic {
                Some(relevant) => push(relevant, &mut memories, &mut seen_ids),
                // No fingerprint available: tier-based PROJECT loading
                None => {
                    for tier in INJECTED_TIERS {
                        let tiered = store.get_memories_by_tier(
                            &agent.id,
                            &[tier],
                            Some(Region::Project),
                            Some(&project.id),
                        )?;
                        push(tiered, &mut memories, &mut seen_ids);
                    }
                }
            }

            // 3. Previous-session continuity
            if let Some(previous) = get_previous_session_id(store, Some(&agent.id), None)? {
                let session_memories =
                    store.get_memories_by_session(&previous, Some(&agent.id), Some(&project.id))?;
                push(session_memories, &mut memories, &mut seen_ids);
            }
        }

        Ok(memories)
    }

    /// Fingerprint the project directory and fetch relevant PROJECT
    /// memories. Returns None when fingerprinting fails, which sends the
    /// caller down the tier-based fallback.
    fn load_semantic_project_memories(
        &self,
        store: &Storage,
        agent: &Agent,
        project: &Project,
        project_dir: &Path,
        embedder: &dyn TextEmbedder,
    ) -> Option<Vec<Memory>> {
        let fingerprint = match ProjectFingerprint::from_directory(project_dir, embedder) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                tracing::warn!("project fingerprint failed: {e}");
                return None;
            }
        };

        match fingerprint.find_relevant_memories(
            store,
            &agent.id,
            &project.id,
            SEMANTIC_PROJECT_CANDIDATES,
            PROJECT_MEMORY_THRESHOLD,
        ) {
            Ok(relevant) => Some(relevant),
            Err(e) => {
                tracing::warn!("semantic project load failed: {e}");
                None
            }
        }
    }

    /// Load memories deferred at session start; no budget cap applies.
    pub fn load_deferred_memories(
        &self,
        store: &Storage,
        deferred_ids: &[String],
        agent: &Agent,
    ) -> Result<String> {
        if deferred_ids.is_empty() {
            return Ok(String::new());
        }

        let mut block = MemoryBlock::new(&agent.name);
        for memory_id in deferred_ids {
            let Some(mut memory) = store.get_memory(memory_id)? else {
                continue;
            };

            if should_verify(&memory, agent.signing_key.as_deref()) {
                let key = agent.signing_key.as_deref().unwrap_or_default();
                memory.signature_valid = Some(verify_signature(&memory, key));
            }

            let mut display = memory.clone();
            display.content = truncate_content(&display.content, self.max_memory_chars);
            block.memories.push(display);

            memory.touch();
            store.save_memory(&memory)?;
        }

        Ok(block.to_dsl())
    }

    /// Memory statistics for this agent/project.
    pub fn get_stats(
        &self,
        store: &Storage,
        agent: &Agent,
        project: Option<&Project>,
    ) -> Result<InjectionStats> {
        let agent_memories =
            store.get_memories_for_agent(&agent.id, Some(Region::Agent), None, None, false, None)?;
        let project_memories = match project {
            Some(project) => store.get_memories_for_agent(
                &agent.id,
                Some(Region::Project),
                Some(&project.id),
                None,
                false,
                None,
            )?,
            None => Vec::new(),
        };

        let mut priority_counts: BTreeMap<String, usize> = BTreeMap::new();
        for memory in agent_memories.iter().chain(project_memories.iter()) {
            *priority_counts
                .entry(memory.impact.as_str().to_string())
                .or_default() += 1;
        }

        Ok(InjectionStats {
            agent_memories: agent_memories.len(),
            project_memories: project_memories.len(),
            total: agent_memories.len() + project_memories.len(),
            budget_tokens: self.budget,
            priority_counts,
        })
    }
}

/// Sort by (impact order, kind order, newest first). WIP is strictly first.
fn prioritize_memories(memories: &mut [Memory]) {
    memories.sort_by(|a, b| {
        a.impact
            .injection_order()
            .cmp(&b.impact.injection_order())
            .then(a.kind.injection_order().cmp(&b.kind.injection_order()))
            .then(b.created_at.cmp(&a.created_at))
    });
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKind;
    use chrono::{Duration, Utc};

    fn test_store() -> (tempfile::TempDir, Storage, Agent) {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::open(dir.path().join("memories.db")).unwrap();
        let agent = Agent::new("agent-1", "Reverie");
        store.save_agent(&agent).unwrap();
        (dir, store, agent)
    }

    fn injector() -> MemoryInjector {
        MemoryInjector::with_limits(20_000, 25_000, 500)
    }

    fn agent_memory(agent: &Agent, kind: MemoryKind, impact: Impact, content: &str) -> Memory {
        Memory::new(&agent.id, Region::Agent, None, kind, content, impact)
    }

    #[test]
    fn test_empty_store_injects_nothing() {
        let (_dir, store, agent) = test_store();
        let result = injector().inject(&store, &agent, None, None, None).unwrap();
        assert_eq!(result.dsl, "");
        assert!(result.injected_ids.is_empty());
        assert!(result.deferred_ids.is_empty());
        assert_eq!(result.deferred_count, 0);
    }

    #[test]
    fn test_core_injected_deep_skipped() {
        let (_dir, store, agent) = test_store();

        let mut core = agent_memory(
            &agent,
            MemoryKind::Emotional,
            Impact::Critical,
            "Matt style",
        );
        core.tier = MemoryTier::Core;
        store.save_memory(&core).unwrap();

        let mut deep = agent_memory(&agent, MemoryKind::Learnings, Impact::Low, "old trivia");
        deep.tier = MemoryTier::Deep;
        deep.created_at = Utc::now() - Duration::days(60);
        store.save_memory(&deep).unwrap();

        let result = injector().inject(&store, &agent, None, None, None).unwrap();
        assert!(result.dsl.contains("Matt style"));
        assert!(!result.dsl.contains("old trivia"));
        assert_eq!(result.injected_ids, vec![core.id]);
    }

    #[test]
    fn test_priority_order_in_dsl() {
        let (_dir, store, agent) = test_store();

        let mut low = agent_memory(&agent, MemoryKind::Learnings, Impact::Low, "Low note");
        low.tier = MemoryTier::Active;
        store.save_memory(&low).unwrap();

        let mut critical = agent_memory(
            &agent,
            MemoryKind::Emotional,
            Impact::Critical,
            "Critical emotional",
        );
        critical.tier = MemoryTier::Core;
        store.save_memory(&critical).unwrap();

        let result = injector().inject(&store, &agent, None, None, None).unwrap();
        let critical_pos = result.dsl.find("Critical emotional").unwrap();
        let low_pos = result.dsl.find("Low note").unwrap();
        assert!(critical_pos < low_pos);
    }

    #[test]
    fn test_wip_is_first() {
        let (_dir, store, agent) = test_store();

        let mut critical = agent_memory(
            &agent,
            MemoryKind::Emotional,
            Impact::Critical,
            "Critical emotional",
        );
        critical.tier = MemoryTier::Core;
        store.save_memory(&critical).unwrap();

        let wip = agent_memory(
            &agent,
            MemoryKind::Learnings,
            Impact::Wip,
            "Recent work before compaction",
        );
        store.save_memory(&wip).unwrap();

        let result = injector().inject(&store, &agent, None, None, None).unwrap();
        let wip_pos = result.dsl.find("Recent work").unwrap();
        let critical_pos = result.dsl.find("Critical emotional").unwrap();
        assert!(wip_pos < critical_pos);
    }

    #[test]
    fn test_budget_defers_overflow() {
        let (_dir, store, agent) = test_store();

        for i in 0..4 {
            let mut memory = agent_memory(
                &agent,
                MemoryKind::Learnings,
                Impact::Medium,
                &format!("note {i} {}", "x".repeat(200)),
            );
            memory.tier = MemoryTier::Active;
            memory.token_count = Some(60);
            memory.created_at = Utc::now() - Duration::minutes(i);
            store.save_memory(&memory).unwrap();
        }

        // Frame overhead is ~4 tokens; two 60-token memories fit in 130
        let tight = MemoryInjector::with_limits(130, 25_000, 500);
        let result = tight.inject(&store, &agent, None, None, None).unwrap();

        assert_eq!(result.injected_ids.len(), 2);
        assert_eq!(result.deferred_count, 2);
        for id in &result.deferred_ids {
            assert!(!result.injected_ids.contains(id));
            let memory = store.get_memory(id).unwrap().unwrap();
            assert!(!result.dsl.contains(&memory.content));
        }
    }

    #[test]
    fn test_byte_cap_defers_overflow() {
        let (_dir, store, agent) = test_store();

        for _ in 0..3 {
            let mut memory = agent_memory(
                &agent,
                MemoryKind::Learnings,
                Impact::Medium,
                &"y".repeat(400),
            );
            memory.tier = MemoryTier::Active;
            memory.token_count = Some(1);
            store.save_memory(&memory).unwrap();
        }

        let tight = MemoryInjector::with_limits(20_000, 500, 500);
        let result = tight.inject(&store, &agent, None, None, None).unwrap();
        assert_eq!(result.injected_ids.len(), 1);
        assert_eq!(result.deferred_count, 2);
        assert!(result.dsl.len() <= 500);
    }

    #[test]
    fn test_injected_memories_are_touched() {
        let (_dir, store, agent) = test_store();

        let mut memory = agent_memory(&agent, MemoryKind::Learnings, Impact::Medium, "touch me");
        memory.tier = MemoryTier::Active;
        memory.last_accessed = Utc::now() - Duration::days(3);
        store.save_memory(&memory).unwrap();
        let before = memory.last_accessed;

        injector().inject(&store, &agent, None, None, None).unwrap();
        let after = store.get_memory(&memory.id).unwrap().unwrap().last_accessed;
        assert!(after > before);
    }

    #[test]
    fn test_invalid_signature_marks_untrusted() {
        let (_dir, store, agent) = test_store();
        let mut signed_agent = agent.clone();
        signed_agent.signing_key = Some("key-1".into());
        store.save_agent(&signed_agent).unwrap();

        let mut memory = agent_memory(
            &signed_agent,
            MemoryKind::Learnings,
            Impact::Medium,
            "tampered content",
        );
        memory.tier = MemoryTier::Active;
        memory.signature = Some("bm90IGEgcmVhbCBzaWduYXR1cmU=".into());
        store.save_memory(&memory).unwrap();

        let result = injector()
            .inject(&store, &signed_agent, None, None, None)
            .unwrap();
        assert!(result.dsl.contains('\u{26a0}'));
    }

    #[test]
    fn test_truncate_content_sentence_boundary() {
        let content = format!("First sentence here. {}", "word ".repeat(200));
        let truncated = truncate_content(&content, 100);
        assert!(truncated.len() <= 100);
        assert!(truncated.ends_with("..."));

        let short = "tiny";
        assert_eq!(truncate_content(short, 100), "tiny");
    }

    #[test]
    fn test_load_deferred_has_no_budget() {
        let (_dir, store, agent) = test_store();

        let mut ids = Vec::new();
        for i in 0..5 {
            let mut memory = agent_memory(
                &agent,
                MemoryKind::Learnings,
                Impact::Medium,
                &format!("deferred payload {i} {}", "z".repeat(300)),
            );
            memory.tier = MemoryTier::Deep;
            store.save_memory(&memory).unwrap();
            ids.push(memory.id);
        }

        let dsl = injector().load_deferred_memories(&store, &ids, &agent).unwrap();
        for i in 0..5 {
            assert!(dsl.contains(&format!("deferred payload {i}")));
        }
    }

    #[test]
    fn test_stats_counts_by_impact() {
        let (_dir, store, agent) = test_store();
        store
            .save_memory(&agent_memory(
                &agent,
                MemoryKind::Learnings,
                Impact::Medium,
                "one",
            ))
            .unwrap();
        store
            .save_memory(&agent_memory(
                &agent,
                MemoryKind::Emotional,
                Impact::Critical,
                "two",
            ))
            .unwrap();

        let stats = injector().get_stats(&store, &agent, None).unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.agent_memories, 2);
        assert_eq!(stats.priority_counts.get("CRITICAL"), Some(&1));
        assert_eq!(stats.priority_counts.get("MEDIUM"), Some(&1));
    }
}
