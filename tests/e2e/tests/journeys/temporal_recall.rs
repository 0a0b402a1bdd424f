//! Temporal recall journeys: cue parsing against a live store, session and
//! git coordinate resolution, and the store queries they drive.

use chrono::{Duration, TimeZone, Utc};
use reverie_core::prelude::*;
use reverie_core::{
    TemporalContext, TemporalCueType, find_all_temporal_cues, parse_temporal_cue,
};
use reverie_e2e_tests::EngineFixture;

#[test]
fn yesterday_cue_resolves_to_midnight_window() {
    let now = Utc.with_ymd_and_hms(2026, 1, 30, 15, 0, 0).unwrap();
    let coord = parse_temporal_cue(
        "What did we do yesterday?",
        now,
        &TemporalContext::default(),
    )
    .unwrap();

    assert_eq!(coord.cue_type, TemporalCueType::RelativeTime);
    assert_eq!(
        coord.start_time,
        Some(Utc.with_ymd_and_hms(2026, 1, 29, 0, 0, 0).unwrap())
    );
    assert_eq!(
        coord.end_time,
        Some(Utc.with_ymd_and_hms(2026, 1, 30, 0, 0, 0).unwrap())
    );
}

#[test]
fn last_session_cue_finds_previous_session_memories() {
    let f = EngineFixture::new();

    // A memory from an earlier session
    let mut earlier = Memory::new(
        &f.agent.id,
        Region::Project,
        Some(f.project.id.clone()),
        MemoryKind::Learnings,
        "we agreed to split the importer into stages",
        Impact::Medium,
    );
    earlier.session_id = Some("20260101-090000-aaaaaaaa".into());
    earlier.created_at = Utc::now() - Duration::hours(5);
    f.store.save_memory(&earlier).unwrap();

    // Then a new session starts and writes its own memory
    let current = start_session(&f.store).unwrap();
    let mut fresh = Memory::new(
        &f.agent.id,
        Region::Project,
        Some(f.project.id.clone()),
        MemoryKind::Learnings,
        "stage two of the importer is underway",
        Impact::Medium,
    );
    fresh.session_id = Some(current);
    f.store.save_memory(&fresh).unwrap();

    let ctx = TemporalContext::gather(&f.store, Some(&f.agent.id), None, None).unwrap();
    let coord =
        parse_temporal_cue("as we discussed last session", Utc::now(), &ctx).unwrap();

    let session_id = coord.session_id.expect("previous session resolved");
    assert_eq!(session_id, "20260101-090000-aaaaaaaa");

    let recalled = f
        .store
        .get_memories_by_session(&session_id, Some(&f.agent.id), None)
        .unwrap();
    assert_eq!(recalled.len(), 1);
    assert!(recalled[0].content.contains("split the importer"));
}

#[test]
fn unresolvable_last_session_leaves_field_empty() {
    let f = EngineFixture::new();
    start_session(&f.store).unwrap();

    let ctx = TemporalContext::gather(&f.store, Some(&f.agent.id), None, None).unwrap();
    let coord = parse_temporal_cue("in the last session", Utc::now(), &ctx).unwrap();
    assert!(coord.session_id.is_none());
    assert!(!coord.has_filters());
}

#[test]
fn commit_prefix_recall_round_trip() {
    let f = EngineFixture::new();

    let mut memory = Memory::new(
        &f.agent.id,
        Region::Project,
        Some(f.project.id.clone()),
        MemoryKind::Achievements,
        "landed the streaming writer",
        Impact::Medium,
    );
    memory.git_commit = Some("deadbeef".into());
    memory.git_branch = Some("main".into());
    f.store.save_memory(&memory).unwrap();

    let by_commit = f
        .store
        .get_memories_by_git_commit("dead", Some(&f.agent.id), None)
        .unwrap();
    assert_eq!(by_commit.len(), 1);

    let by_branch = f
        .store
        .get_memories_by_git_branch("main", Some(&f.agent.id), None, 10)
        .unwrap();
    assert_eq!(by_branch.len(), 1);

    let coord = parse_temporal_cue(
        "what did we do on main",
        Utc::now(),
        &TemporalContext::default(),
    )
    .unwrap();
    assert_eq!(coord.git_branch.as_deref(), Some("main"));
}

#[test]
fn multiple_cues_in_one_message() {
    let cues = find_all_temporal_cues(
        "yesterday we revisited what we planned last week on main",
        Utc::now(),
        &TemporalContext::default(),
    );

    assert!(cues.iter().any(|c| c.original_text == "yesterday"));
    assert!(cues.iter().any(|c| c.original_text == "last week"));
    assert!(
        cues.iter()
            .any(|c| c.git_branch.as_deref() == Some("main"))
    );
}

#[test]
fn time_window_query_matches_coordinate() {
    let f = EngineFixture::new();
    let now = Utc::now();

    let mut yesterday_memory = Memory::new(
        &f.agent.id,
        Region::Agent,
        None,
        MemoryKind::Learnings,
        "a note from yesterday afternoon",
        Impact::Medium,
    );
    yesterday_memory.created_at = now - Duration::hours(20);
    f.store.save_memory(&yesterday_memory).unwrap();

    let mut old_memory = Memory::new(
        &f.agent.id,
        Region::Agent,
        None,
        MemoryKind::Learnings,
        "a note from last month",
        Impact::Medium,
    );
    old_memory.created_at = now - Duration::days(25);
    f.store.save_memory(&old_memory).unwrap();

    let coord = parse_temporal_cue(
        "what happened recently?",
        now,
        &TemporalContext::default(),
    )
    .unwrap();

    // Apply the coordinate as an AND-conjoined filter over the store
    let all = f
        .store
        .get_memories_for_agent(&f.agent.id, None, None, None, false, None)
        .unwrap();
    let hits: Vec<_> = all
        .into_iter()
        .filter(|m| {
            coord.start_time.is_none_or(|start| m.created_at >= start)
                && coord.end_time.is_none_or(|end| m.created_at <= end)
        })
        .collect();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, yesterday_memory.id);
}

#[test]
fn substring_search_respects_literal_wildcards() {
    let f = EngineFixture::new();

    let literal = Memory::new(
        &f.agent.id,
        Region::Agent,
        None,
        MemoryKind::Learnings,
        "the 95th_percentile column is misnamed",
        Impact::Medium,
    );
    f.store.save_memory(&literal).unwrap();

    let decoy = Memory::new(
        &f.agent.id,
        Region::Agent,
        None,
        MemoryKind::Learnings,
        "the 95th-percentile column is misnamed",
        Impact::Medium,
    );
    f.store.save_memory(&decoy).unwrap();

    // An unescaped `_` would match both rows
    let hits = f
        .store
        .search_memories(&f.agent.id, "95th_percentile", None, 10, false)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, literal.id);
    assert_ne!(hits[0].id, decoy.id);
}
