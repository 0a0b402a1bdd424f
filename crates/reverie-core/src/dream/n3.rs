//! N3 - deep processing
//!
//! The editor cutting to essence: compress verbose memories to gists,
//! flag contradictions between highly-similar memories, and validate that
//! each memory sits in the right region. Conflicts land in the dissonance
//! queue for a human; nothing is auto-resolved.

use std::sync::LazyLock;
use std::time::Instant;

use chrono::{Duration, Utc};
use regex::Regex;

use crate::embeddings::cosine_similarity;
use crate::memory::{Impact, Memory, Region};
use crate::storage::{Result, Storage};
use crate::text::split_sentences;

use super::types::{Contradiction, DreamConfig, GistResult, N3Result, ScopeIssue};

/// Sentences carrying these phrases survive into the gist.
const GIST_SIGNALS: &[&str] = &[
    "key insight",
    "important",
    "learned that",
    "realized",
    "discovered",
    "conclusion",
    "takeaway",
    "main point",
    "critical",
    "essential",
    "must",
    "always",
    "never",
];

/// Words suggesting a statement is negated.
const NEGATION_WORDS: &[&str] = &[
    "not",
    "never",
    "don't",
    "doesn't",
    "isn't",
    "aren't",
    "wasn't",
    "weren't",
    "won't",
    "can't",
    "shouldn't",
    "wouldn't",
    "couldn't",
    "no longer",
    "anymore",
];

/// Absolute-word pairs whose co-occurrence across two memories signals a
/// contradiction.
const OPPOSITE_PAIRS: &[(&str, &str)] = &[
    ("always", "never"),
    ("everything", "nothing"),
    ("everyone", "no one"),
    ("all", "none"),
    ("completely", "not at all"),
];

/// Similarity above which a negation mismatch counts as a contradiction.
const NEGATION_SIMILARITY: f32 = 0.75;

/// Phrases marking agent-wide insights.
const AGENT_SIGNALS: &[&str] = &[
    "i learned",
    "key insight",
    "general principle",
    "always remember",
    "this applies to",
    "across projects",
    "important lesson",
    "fundamental",
    "universal",
];

/// Phrases marking project-specific content.
const PROJECT_SIGNALS: &[&str] = &[
    "in this project",
    "for this codebase",
    "commit",
    "release",
    "deployed",
    "this repo",
    "api endpoint",
    "database schema",
];

/// Phrases marking a completed achievement.
const ACHIEVEMENT_SIGNALS: &[&str] = &["built", "released", "completed", "shipped", "implemented"];

/// Version strings like v0.1.2 or v1.0.
static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bv\d+\.\d+(?:\.\d+)?\b").expect("version pattern compiles"));

/// Project-name matches shorter than this are ignored (too many false
/// positives on common short words).
const MIN_PROJECT_NAME_LEN: usize = 4;

/// Run the N3 deep-processing stage.
pub fn run_n3_processing(
    store: &Storage,
    agent_id: &str,
    project_id: Option<&str>,
    config: &DreamConfig,
) -> Result<N3Result> {
    let start = Instant::now();
    tracing::info!("N3: deep processing");

    let cutoff = Utc::now() - Duration::days(config.project_lookback_days);
    let memories: Vec<Memory> = store
        .get_memories_for_agent(agent_id, None, project_id, None, false, None)?
        .into_iter()
        .filter(|m| m.created_at >= cutoff)
        .collect();

    // Phase 1: gist extraction. The gist replaces the working content; the
    // original text stays in original_content.
    let mut gist_results: Vec<GistResult> = Vec::new();
    for memory in &memories {
        if !needs_gist(memory, config) {
            continue;
        }
        let Some(gist) = extract_gist(&memory.content, config.n3_gist_max_tokens) else {
            continue;
        };

        let mut updated = memory.clone();
        updated.content = gist.clone();
        store.save_memory(&updated)?;

        gist_results.push(GistResult {
            memory_id: memory.id.clone(),
            original_length: memory.content.len(),
            gist_length: gist.len(),
            gist,
        });
    }
    tracing::debug!(gists = gist_results.len(), "gist extraction finished");

    // Phase 2: contradiction detection among recent embedded memories
    let recent_embedded: Vec<_> = store
        .get_memories_with_temporal_context(agent_id, project_id, false)?
        .into_iter()
        .filter(|m| m.created_at >= cutoff)
        .collect();

    let mut contradictions: Vec<Contradiction> = Vec::new();
    for (i, a) in recent_embedded.iter().enumerate() {
        for b in &recent_embedded[i + 1..] {
            let similarity = cosine_similarity(&a.embedding, &b.embedding);
            if similarity < config.n3_contradiction_threshold {
                continue;
            }
            if let Some(contradiction) =
                detect_contradiction(&a.id, &a.content, &b.id, &b.content, similarity)
            {
                contradictions.push(contradiction);
            }
        }
    }
    tracing::debug!(
        candidates = contradictions.len(),
        "contradiction detection finished"
    );

    // Phase 3: scope validation
    let known_projects: Vec<(String, String)> = store
        .get_projects()?
        .into_iter()
        .map(|p| (p.id.to_lowercase(), p.name.to_lowercase()))
        .collect();
    let mut known_names: Vec<String> = Vec::new();
    for (id, name) in known_projects {
        known_names.push(id);
        known_names.push(name);
    }

    let unvalidated = store.get_unvalidated_memories(agent_id, config.n2_process_limit)?;
    let mut scope_issues: Vec<ScopeIssue> = Vec::new();
    let mut memories_validated = 0;

    for memory in &unvalidated {
        match detect_scope_issue(memory, &known_names) {
            Some(issue) => scope_issues.push(issue),
            None => {
                store.mark_memory_validated(&memory.id)?;
                memories_validated += 1;
            }
        }
    }

    // Phase 4: queue persistence, idempotent against existing rows
    let mut dissonance_queue_additions = 0;
    for contradiction in &contradictions {
        if !store.dissonance_exists(&contradiction.memory_id_a, &contradiction.memory_id_b)? {
            store.add_dissonance(
                agent_id,
                &contradiction.memory_id_a,
                &contradiction.memory_id_b,
                &contradiction.description,
            )?;
            dissonance_queue_additions += 1;
        }
    }
    for issue in &scope_issues {
        if !store.scope_issue_exists(&issue.memory_id)? {
            store.add_scope_issue(
                agent_id,
                &issue.memory_id,
                &issue.reason,
                &issue.suggested_region,
                issue.suggested_project_id.as_deref(),
            )?;
            dissonance_queue_additions += 1;
        }
    }

    tracing::info!(
        gists = gist_results.len(),
        contradictions = contradictions.len(),
        scope_issues = scope_issues.len(),
        queued = dissonance_queue_additions,
        "N3 complete"
    );

    Ok(N3Result {
        gists_created: gist_results.len(),
        gist_results,
        contradictions_found: contradictions.len(),
        contradictions,
        scope_issues_found: scope_issues.len(),
        scope_issues,
        memories_validated,
        dissonance_queue_additions,
        duration_seconds: start.elapsed().as_secs_f64(),
        memories_processed: memories.len(),
    })
}

/// A memory needs a gist when it is long enough to benefit and not
/// CRITICAL (those keep full detail forever).
fn needs_gist(memory: &Memory, config: &DreamConfig) -> bool {
    if memory.impact == Impact::Critical {
        return false;
    }
    if memory.content.len() < 200 {
        return false;
    }
    let target_chars = config.n3_gist_max_tokens * 4;
    memory.content.len() > target_chars * 2
}

/// Extract a gist: the first sentence plus any signal-phrase sentences that
/// fit within the target budget.
pub(crate) fn extract_gist(content: &str, gist_max_tokens: usize) -> Option<String> {
    let sentences = split_sentences(content);
    let first = sentences.first()?;

    let target_chars = gist_max_tokens * 4;
    let mut parts: Vec<&str> = vec![first.as_str()];
    let mut current_length = first.len();

    for sentence in &sentences[1..] {
        let lower = sentence.to_lowercase();
        if !GIST_SIGNALS.iter().any(|signal| lower.contains(signal)) {
            continue;
        }
        if current_length + sentence.len() + 1 > target_chars {
            break;
        }
        parts.push(sentence.as_str());
        current_length += sentence.len() + 1;
    }

    let mut gist = parts.join(" ");
    if !gist.ends_with('.') && !gist.ends_with('!') && !gist.ends_with('?') {
        gist.push('.');
    }
    Some(gist)
}

fn truncate_preview(content: &str) -> String {
    if content.chars().count() > 200 {
        let cut: String = content.chars().take(200).collect();
        format!("{cut}...")
    } else {
        content.to_string()
    }
}

/// Check whether two similar memories contradict each other.
pub(crate) fn detect_contradiction(
    memory_id_a: &str,
    content_a: &str,
    memory_id_b: &str,
    content_b: &str,
    similarity: f32,
) -> Option<Contradiction> {
    let lower_a = content_a.to_lowercase();
    let lower_b = content_b.to_lowercase();

    let a_negated = NEGATION_WORDS.iter().any(|w| lower_a.contains(w));
    let b_negated = NEGATION_WORDS.iter().any(|w| lower_b.contains(w));

    // Exactly one side negated = likely contradiction
    if a_negated != b_negated && similarity > NEGATION_SIMILARITY {
        return Some(Contradiction {
            memory_id_a: memory_id_a.to_string(),
            memory_id_b: memory_id_b.to_string(),
            content_a: truncate_preview(content_a),
            content_b: truncate_preview(content_b),
            description: format!(
                "Negation-based contradiction detected (similarity: {similarity:.2})"
            ),
            similarity,
        });
    }

    for (word_a, word_b) in OPPOSITE_PAIRS {
        let cross = (lower_a.contains(word_a) && lower_b.contains(word_b))
            || (lower_a.contains(word_b) && lower_b.contains(word_a));
        if cross {
            return Some(Contradiction {
                memory_id_a: memory_id_a.to_string(),
                memory_id_b: memory_id_b.to_string(),
                content_a: truncate_preview(content_a),
                content_b: truncate_preview(content_b),
                description: format!(
                    "Opposite absolutes ({word_a}/{word_b}) detected (similarity: {similarity:.2})"
                ),
                similarity,
            });
        }
    }

    None
}

/// Check whether a memory looks mis-assigned to its region.
pub(crate) fn detect_scope_issue(memory: &Memory, known_projects: &[String]) -> Option<ScopeIssue> {
    let content = memory.content.to_lowercase();

    let has_version = VERSION_PATTERN.is_match(&content);
    let mentioned_project = known_projects
        .iter()
        .find(|name| name.len() >= MIN_PROJECT_NAME_LEN && content.contains(name.as_str()));

    let has_agent_signals = AGENT_SIGNALS.iter().any(|s| content.contains(s));
    let has_project_signals = PROJECT_SIGNALS.iter().any(|s| content.contains(s));
    let has_achievement = ACHIEVEMENT_SIGNALS.iter().any(|s| content.contains(s));

    match memory.region {
        Region::Agent => {
            if let Some(project) = mentioned_project {
                if has_version && has_achievement {
                    return Some(ScopeIssue {
                        memory_id: memory.id.clone(),
                        content: truncate_preview(&memory.content),
                        current_region: memory.region.as_str().to_string(),
                        current_project_id: memory.project_id.clone(),
                        suggested_region: Region::Project.as_str().to_string(),
                        suggested_project_id: Some(project.clone()),
                        reason: format!(
                            "AGENT memory mentions project '{project}' with version number and achievement"
                        ),
                    });
                }
            }
            if has_version && has_project_signals && !has_agent_signals {
                return Some(ScopeIssue {
                    memory_id: memory.id.clone(),
                    content: truncate_preview(&memory.content),
                    current_region: memory.region.as_str().to_string(),
                    current_project_id: memory.project_id.clone(),
                    suggested_region: Region::Project.as_str().to_string(),
                    suggested_project_id: None,
                    reason: "AGENT memory has version number and project-specific signals \
                             without agent-wide learning"
                        .to_string(),
                });
            }
        }
        Region::Project => {
            if has_agent_signals && !has_version && !has_project_signals {
                return Some(ScopeIssue {
                    memory_id: memory.id.clone(),
                    content: truncate_preview(&memory.content),
                    current_region: memory.region.as_str().to_string(),
                    current_project_id: memory.project_id.clone(),
                    suggested_region: Region::Agent.as_str().to_string(),
                    suggested_project_id: None,
                    reason: "PROJECT memory contains general learning without project-specific \
                             context"
                        .to_string(),
                });
            }
        }
    }

    None
}
