//! Memory graph journeys: BUILDS_ON evolution chains, link idempotence,
//! and bidirectional traversal against the real store.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use reverie_core::prelude::*;
use reverie_core::{
    LinkKind, StubEmbedder, TextEmbedder, cosine_similarity, get_linked_memories,
    get_memory_chain, suggest_link_type,
};
use reverie_e2e_tests::EngineFixture;

#[test]
fn builds_on_chain_evolves_across_memories() {
    let f = EngineFixture::new();
    let t0 = Utc::now() - Duration::hours(2);

    // M1 at T0 and M2 at T0+1h, same session, high similarity
    let m2_content = "Building on earlier observation, the cache stampede needs jittered expiry";
    let kind = suggest_link_type(m2_content, 0.8, Some(t0 + Duration::hours(1)), Some(t0), true);
    assert_eq!(kind, LinkKind::BuildsOn);

    // M3 with an update marker, lower similarity, same session
    let m3_content = "Update: jittered expiry fixed the stampede entirely";
    let kind = suggest_link_type(
        m3_content,
        0.65,
        Some(t0 + Duration::hours(2)),
        Some(t0 + Duration::hours(1)),
        true,
    );
    assert_eq!(kind, LinkKind::BuildsOn);

    // Persist the chain and walk it
    let m1 = f.embedded_memory(
        "observed a cache stampede when many keys expire together",
        MemoryKind::Learnings,
        Impact::Medium,
    );
    let m2 = f.embedded_memory(m2_content, MemoryKind::Learnings, Impact::Medium);
    let m3 = f.embedded_memory(m3_content, MemoryKind::Learnings, Impact::Medium);

    f.store
        .save_link(&m2.id, &m1.id, LinkKind::BuildsOn, Some(0.8))
        .unwrap();
    f.store
        .save_link(&m3.id, &m2.id, LinkKind::BuildsOn, Some(0.65))
        .unwrap();

    let get_links = |id: &str| f.store.get_links_for_memory(id).unwrap();
    let get_memory = |id: &str| {
        f.store
            .get_memory(id)
            .unwrap()
            .map(|m| (m.id.clone(), m.content.clone()))
    };

    let chain = get_memory_chain(&m3.id, get_links, get_memory, LinkKind::BuildsOn, 10);
    let ids: Vec<&str> = chain.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec![m3.id.as_str(), m2.id.as_str(), m1.id.as_str()]);
}

#[test]
fn link_pair_is_unique_and_bidirectional() {
    let f = EngineFixture::new();
    let a = f.embedded_memory("first memory", MemoryKind::Learnings, Impact::Medium);
    let b = f.embedded_memory("second memory", MemoryKind::Learnings, Impact::Medium);

    f.store
        .save_link(&a.id, &b.id, LinkKind::RelatesTo, Some(0.55))
        .unwrap();
    f.store
        .save_link(&a.id, &b.id, LinkKind::Contradicts, Some(0.9))
        .unwrap();

    // Exactly one row per ordered pair; the re-save overwrote it
    let links = f.store.get_links_for_memory(&a.id).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].kind, LinkKind::Contradicts);
    assert_eq!(links[0].similarity, Some(0.9));

    // Both endpoints see each other
    assert_eq!(
        f.store.get_linked_memory_ids(&a.id, None).unwrap(),
        vec![b.id.clone()]
    );
    assert_eq!(
        f.store.get_linked_memory_ids(&b.id, None).unwrap(),
        vec![a.id.clone()]
    );
}

#[test]
fn traversal_walks_undirected_with_depth() {
    let f = EngineFixture::new();
    let a = f.embedded_memory("memory a", MemoryKind::Learnings, Impact::Medium);
    let b = f.embedded_memory("memory b", MemoryKind::Learnings, Impact::Medium);
    let c = f.embedded_memory("memory c", MemoryKind::Learnings, Impact::Medium);

    // a -> b, c -> b: from a, c is reachable in two undirected hops
    f.store
        .save_link(&a.id, &b.id, LinkKind::RelatesTo, Some(0.6))
        .unwrap();
    f.store
        .save_link(&c.id, &b.id, LinkKind::RelatesTo, Some(0.6))
        .unwrap();

    let get_links = |id: &str| f.store.get_links_for_memory(id).unwrap();
    let get_memory = |id: &str| {
        f.store
            .get_memory(id)
            .unwrap()
            .map(|m| (m.id.clone(), m.content.clone()))
    };

    let depth_one = get_linked_memories(&a.id, get_links, get_memory, 1, None);
    assert_eq!(depth_one.len(), 1);
    assert_eq!(depth_one[0].memory_id, b.id);

    let get_links = |id: &str| f.store.get_links_for_memory(id).unwrap();
    let get_memory = |id: &str| {
        f.store
            .get_memory(id)
            .unwrap()
            .map(|m| (m.id.clone(), m.content.clone()))
    };
    let depth_two = get_linked_memories(&a.id, get_links, get_memory, 2, None);
    let reached: HashSet<&str> = depth_two.iter().map(|m| m.memory_id.as_str()).collect();
    assert!(reached.contains(b.id.as_str()));
    assert!(reached.contains(c.id.as_str()));
}

#[test]
fn remember_creates_relates_to_links_above_threshold() {
    let f = EngineFixture::new();
    start_session(&f.store).unwrap();

    remember(
        &f.store,
        Some(&StubEmbedder),
        &f.agent,
        None,
        None,
        RememberRequest::new("the scheduler thread pool starves long running readers"),
    )
    .unwrap();

    let outcome = remember(
        &f.store,
        Some(&StubEmbedder),
        &f.agent,
        None,
        None,
        RememberRequest::new("the scheduler thread pool starves short running writers"),
    )
    .unwrap();

    assert!(outcome.semantic_links + outcome.builds_on_links >= 1);
    assert!(
        !f.store
            .get_linked_memory_ids(&outcome.memory.id, None)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn similar_texts_rank_above_distant_ones() {
    let close_a = StubEmbedder
        .embed("tokio async runtime executor tasks")
        .unwrap();
    let close_b = StubEmbedder
        .embed("tokio async runtime executor workers")
        .unwrap();
    let far = StubEmbedder
        .embed("garden compost watering seedlings spring")
        .unwrap();

    assert!(cosine_similarity(&close_a, &close_b) > cosine_similarity(&close_a, &far));
}

#[test]
fn superseded_memory_leaves_chain_intact() {
    let f = EngineFixture::new();
    let old = f.embedded_memory("v1 of the rule", MemoryKind::Architectural, Impact::High);
    let new = f.embedded_memory("v2 of the rule", MemoryKind::Architectural, Impact::High);

    f.store.supersede_memory(&old.id, &new.id).unwrap();
    f.store
        .save_link(&new.id, &old.id, LinkKind::Supersedes, None)
        .unwrap();

    let loaded = f.store.get_memory(&old.id).unwrap().unwrap();
    assert_eq!(loaded.superseded_by.as_deref(), Some(new.id.as_str()));

    // Non-superseded queries hide the old row; the link remains walkable
    let visible = f
        .store
        .get_memories_for_agent(&f.agent.id, None, None, None, false, None)
        .unwrap();
    assert!(visible.iter().all(|m| m.id != old.id));
    assert_eq!(
        f.store
            .get_linked_memory_ids(&new.id, Some(LinkKind::Supersedes))
            .unwrap(),
        vec![old.id.clone()]
    );
}
