//! N2 - memory consolidation
//!
//! The librarian organizing shelves: discover BUILDS_ON/RELATES_TO links
//! that were never recorded, then promote the impact of hub memories that
//! many others point at. Re-running is idempotent - existing link pairs are
//! skipped in both directions.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{Duration, Utc};

use crate::graph::linker::{DEFAULT_TIME_WINDOW_HOURS, find_builds_on_candidates};
use crate::memory::{Impact, TemporalMemory};
use crate::storage::{Result, Storage};

use super::types::{DiscoveredLink, DreamConfig, ImpactAdjustment, N2Result};

/// Incoming links at which a LOW/MEDIUM memory becomes HIGH.
const HUB_THRESHOLD: usize = 10;

/// Incoming links at which a LOW memory becomes MEDIUM.
const MINOR_HUB_THRESHOLD: usize = 5;

/// Run the N2 consolidation stage.
pub fn run_n2_consolidation(
    store: &Storage,
    agent_id: &str,
    project_id: Option<&str>,
    config: &DreamConfig,
) -> Result<N2Result> {
    let start = Instant::now();
    tracing::info!("N2: consolidating memories");

    let memories = processable_memories(store, agent_id, project_id, config)?;
    tracing::debug!(count = memories.len(), "memories with embeddings in window");

    if memories.is_empty() {
        return Ok(N2Result {
            new_links_found: 0,
            links: Vec::new(),
            impact_adjustments: Vec::new(),
            duration_seconds: start.elapsed().as_secs_f64(),
            memories_processed: 0,
        });
    }

    // Phase 1: link discovery
    let ids: Vec<String> = memories.iter().map(|m| m.id.clone()).collect();
    let mut existing_pairs = store.get_existing_link_pairs(&ids)?;

    let mut new_links: Vec<DiscoveredLink> = Vec::new();
    let mut processed = 0;

    for memory in &memories {
        if processed >= config.n2_process_limit {
            break;
        }

        let others: Vec<TemporalMemory> = memories
            .iter()
            .filter(|m| m.id != memory.id)
            .cloned()
            .collect();

        let candidates = find_builds_on_candidates(
            &memory.content,
            &memory.embedding,
            memory.session_id.as_deref(),
            memory.created_at,
            &others,
            config.n2_similarity_threshold,
            DEFAULT_TIME_WINDOW_HOURS,
            config.n2_max_links_per_memory,
        );

        for candidate in candidates {
            let forward = (memory.id.clone(), candidate.memory_id.clone());
            let reverse = (candidate.memory_id.clone(), memory.id.clone());
            if existing_pairs.contains(&forward) || existing_pairs.contains(&reverse) {
                continue;
            }

            let kind = candidate.link_kind();
            store.save_link(&memory.id, &candidate.memory_id, kind, Some(candidate.similarity))?;

            new_links.push(DiscoveredLink {
                source_id: memory.id.clone(),
                target_id: candidate.memory_id.clone(),
                link_type: kind.as_str().to_string(),
                similarity: candidate.similarity,
            });
            existing_pairs.insert(forward);
        }

        processed += 1;
    }

    tracing::debug!(new_links = new_links.len(), "link discovery finished");

    // Phase 2: impact adjustment from link topology
    let mut impact_adjustments: Vec<ImpactAdjustment> = Vec::new();
    for (memory_id, incoming) in count_incoming_links(store, &ids)? {
        let Some(memory) = store.get_memory(&memory_id)? else {
            continue;
        };
        let Some(new_impact) = suggest_impact_from_topology(memory.impact, incoming) else {
            continue;
        };

        store.update_impact(&memory.id, new_impact)?;
        impact_adjustments.push(ImpactAdjustment {
            memory_id: memory.id.clone(),
            old_impact: memory.impact.as_str().to_string(),
            new_impact: new_impact.as_str().to_string(),
        });
    }

    tracing::info!(
        links = new_links.len(),
        adjustments = impact_adjustments.len(),
        "N2 complete"
    );

    Ok(N2Result {
        new_links_found: new_links.len(),
        links: new_links,
        impact_adjustments,
        duration_seconds: start.elapsed().as_secs_f64(),
        memories_processed: processed,
    })
}

/// Memories with embeddings and temporal context inside the lookback window.
fn processable_memories(
    store: &Storage,
    agent_id: &str,
    project_id: Option<&str>,
    config: &DreamConfig,
) -> Result<Vec<TemporalMemory>> {
    let project_filter = if config.include_project_memories {
        project_id
    } else {
        None
    };
    let all = store.get_memories_with_temporal_context(agent_id, project_filter, false)?;

    let cutoff = Utc::now() - Duration::days(config.project_lookback_days);
    Ok(all.into_iter().filter(|m| m.created_at >= cutoff).collect())
}

/// Count incoming links (this memory as TARGET) for each id.
fn count_incoming_links(store: &Storage, memory_ids: &[String]) -> Result<HashMap<String, usize>> {
    let mut counts = HashMap::new();
    for memory_id in memory_ids {
        let incoming = store
            .get_links_for_memory(memory_id)?
            .iter()
            .filter(|link| &link.target_id == memory_id)
            .count();
        if incoming > 0 {
            counts.insert(memory_id.clone(), incoming);
        }
    }
    Ok(counts)
}

/// Suggest an impact promotion for a hub memory. CRITICAL never changes;
/// nothing is ever downgraded.
fn suggest_impact_from_topology(impact: Impact, incoming: usize) -> Option<Impact> {
    if impact == Impact::Critical {
        return None;
    }
    if incoming >= HUB_THRESHOLD && matches!(impact, Impact::Low | Impact::Medium) {
        return Some(Impact::High);
    }
    if incoming >= MINOR_HUB_THRESHOLD && impact == Impact::Low {
        return Some(Impact::Medium);
    }
    None
}
