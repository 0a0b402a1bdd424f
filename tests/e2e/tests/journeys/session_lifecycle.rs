//! Session lifecycle journeys: fresh-agent injection, tier priority,
//! budget/deferral behavior, deferred loading, and session-end decay.

use chrono::{Duration, Utc};
use reverie_core::prelude::*;
use reverie_core::{DecayEngine, get_current_session_id};
use reverie_e2e_tests::EngineFixture;

#[test]
fn fresh_agent_no_project_injects_nothing() {
    let f = EngineFixture::new();
    let injector = MemoryInjector::new(&EngineConfig::default());

    let result = injector
        .inject(&f.store, &f.agent, None, None, None)
        .unwrap();

    assert_eq!(result.dsl, "");
    assert!(result.injected_ids.is_empty());
    assert!(result.deferred_ids.is_empty());
    assert_eq!(result.deferred_count, 0);
}

#[test]
fn tier_priority_core_in_deep_out() {
    let f = EngineFixture::new();

    let mut core = Memory::new(
        &f.agent.id,
        Region::Agent,
        None,
        MemoryKind::Emotional,
        "Matt style",
        Impact::Critical,
    );
    core.tier = MemoryTier::Core;
    f.store.save_memory(&core).unwrap();

    let mut deep = Memory::new(
        &f.agent.id,
        Region::Agent,
        None,
        MemoryKind::Learnings,
        "sixty day old trivia",
        Impact::Low,
    );
    deep.tier = MemoryTier::Deep;
    deep.created_at = Utc::now() - Duration::days(60);
    deep.last_accessed = deep.created_at;
    f.store.save_memory(&deep).unwrap();

    let injector = MemoryInjector::new(&EngineConfig::default());
    let result = injector
        .inject(&f.store, &f.agent, None, None, None)
        .unwrap();

    assert!(result.dsl.contains("Matt style"));
    assert!(!result.dsl.contains("sixty day old trivia"));
}

#[test]
fn budget_boundary_last_fit_in_next_deferred() {
    let f = EngineFixture::new();

    for i in 0..3 {
        let mut memory = Memory::new(
            &f.agent.id,
            Region::Agent,
            None,
            MemoryKind::Learnings,
            format!("budget probe number {i}"),
            Impact::Medium,
        );
        memory.tier = MemoryTier::Active;
        memory.token_count = Some(50);
        memory.created_at = Utc::now() - Duration::minutes(i);
        f.store.save_memory(&memory).unwrap();
    }

    // Frame is ~5 estimated tokens; exactly two 50-token memories fit in 105
    let injector = MemoryInjector::with_limits(105, 25_000, 500);
    let result = injector
        .inject(&f.store, &f.agent, None, None, None)
        .unwrap();

    assert_eq!(result.injected_ids.len(), 2);
    assert_eq!(result.deferred_count, 1);

    // Deferred ids appear nowhere in the emitted block
    for id in &result.deferred_ids {
        assert!(!result.injected_ids.contains(id));
        let memory = f.store.get_memory(id).unwrap().unwrap();
        assert!(!result.dsl.contains(&memory.content));
    }
}

#[test]
fn deferred_ids_load_later_without_budget() {
    let f = EngineFixture::new();

    for i in 0..6 {
        let mut memory = Memory::new(
            &f.agent.id,
            Region::Agent,
            None,
            MemoryKind::Learnings,
            format!("session context piece {i}"),
            Impact::Medium,
        );
        memory.tier = MemoryTier::Active;
        memory.token_count = Some(40);
        f.store.save_memory(&memory).unwrap();
    }

    let injector = MemoryInjector::with_limits(100, 25_000, 500);
    let first = injector
        .inject(&f.store, &f.agent, None, None, None)
        .unwrap();
    assert!(first.deferred_count > 0);

    let second_block = injector
        .load_deferred_memories(&f.store, &first.deferred_ids, &f.agent)
        .unwrap();
    for id in &first.deferred_ids {
        let memory = f.store.get_memory(id).unwrap().unwrap();
        assert!(second_block.contains(&memory.content));
    }
}

#[test]
fn wip_memory_leads_the_block() {
    let f = EngineFixture::new();

    let mut core = Memory::new(
        &f.agent.id,
        Region::Agent,
        None,
        MemoryKind::Emotional,
        "collaboration style",
        Impact::Critical,
    );
    core.tier = MemoryTier::Core;
    f.store.save_memory(&core).unwrap();

    let wip = Memory::new(
        &f.agent.id,
        Region::Project,
        Some(f.project.id.clone()),
        MemoryKind::Learnings,
        "work in flight before compaction",
        Impact::Wip,
    );
    f.store.save_memory(&wip).unwrap();

    let injector = MemoryInjector::new(&EngineConfig::default());
    let result = injector
        .inject(&f.store, &f.agent, Some(&f.project), None, None)
        .unwrap();

    let wip_pos = result.dsl.find("work in flight").unwrap();
    let core_pos = result.dsl.find("collaboration style").unwrap();
    assert!(wip_pos < core_pos);
}

#[test]
fn session_start_records_current_session_id() {
    let f = EngineFixture::new();
    let session_id = start_session(&f.store).unwrap();
    assert_eq!(
        get_current_session_id(&f.store).unwrap(),
        Some(session_id)
    );
}

#[test]
fn session_end_decay_compacts_and_preserves_critical() {
    let f = EngineFixture::new();
    let now = Utc::now();

    let mut stale = Memory::new(
        &f.agent.id,
        Region::Agent,
        None,
        MemoryKind::Learnings,
        "We tried the new cache today. It warmed slowly. We must never disable the warmup step.",
        Impact::Medium,
    );
    stale.created_at = now - Duration::days(10);
    f.store.save_memory(&stale).unwrap();

    let mut critical = Memory::new(
        &f.agent.id,
        Region::Agent,
        None,
        MemoryKind::Emotional,
        "Full detail forever. Every word matters here. All of it stays.",
        Impact::Critical,
    );
    critical.created_at = now - Duration::days(400);
    f.store.save_memory(&critical).unwrap();

    let outcome = DecayEngine::process_decay(&f.store, &f.agent.id, None, now).unwrap();
    assert_eq!(outcome.compacted, vec![stale.id.clone()]);
    assert_eq!(outcome.deleted, 0);

    let compacted = f.store.get_memory(&stale.id).unwrap().unwrap();
    assert!(compacted.content.starts_with("We tried the new cache today."));
    assert!(compacted.content.contains("must never disable"));
    assert!(!compacted.content.contains("warmed slowly"));
    // The original text survives untouched
    assert!(compacted.original_content.contains("warmed slowly"));

    let untouched = f.store.get_memory(&critical.id).unwrap().unwrap();
    assert_eq!(untouched.content, critical.content);
}

#[test]
fn remembered_memory_round_trips_through_injection() {
    let f = EngineFixture::new();
    start_session(&f.store).unwrap();

    let outcome = remember(
        &f.store,
        Some(&StubEmbedder),
        &f.agent,
        Some(&f.project),
        None,
        RememberRequest::new("Key insight: always batch writes before validation"),
    )
    .unwrap();
    assert_eq!(outcome.memory.impact, Impact::Critical);

    let injector = MemoryInjector::new(&EngineConfig::default());
    let result = injector
        .inject(&f.store, &f.agent, Some(&f.project), None, None)
        .unwrap();
    assert!(result.dsl.contains("always batch writes"));
    assert!(result.injected_ids.contains(&outcome.memory.id));
}
