//! Dream cycle journeys: the full N2/N3/REM pipeline, contradiction
//! queueing idempotence, crash recovery, and session retention.

use reverie_core::prelude::*;
use reverie_core::{
    DissonanceKind, DreamState, DreamStage, N2Result,
};
use reverie_e2e_tests::EngineFixture;

fn runner<'a>(f: &'a EngineFixture) -> DreamRunner<'a> {
    DreamRunner::new(
        &f.store,
        DreamConfig::default(),
        f.diary.clone(),
        &f.journal_dir,
    )
}

#[test]
fn full_cycle_produces_all_stage_results() {
    let f = EngineFixture::new();
    f.embedded_memory(
        "observed the importer stalling on wide csv rows",
        MemoryKind::Learnings,
        Impact::Medium,
    );
    f.embedded_memory(
        "building on that observation the importer stall is quadratic parsing",
        MemoryKind::Learnings,
        Impact::Medium,
    );

    let outcome = runner(&f).dream(&f.agent.id, None).unwrap();

    let n2 = outcome.n2.expect("n2 ran");
    assert!(n2.memories_processed >= 2);
    assert!(outcome.n3.is_some());
    let rem = outcome.rem.expect("rem ran");
    assert!(rem.dream_journal_path.is_some());

    let session = f
        .store
        .get_dream_session(&outcome.session_id)
        .unwrap()
        .unwrap();
    assert_eq!(session.state, DreamState::Complete);
}

#[test]
fn n3_contradiction_lands_in_dissonance_queue_once() {
    let f = EngineFixture::new();
    f.embedded_memory(
        "The API always returns JSON for every request we send",
        MemoryKind::Learnings,
        Impact::Medium,
    );
    f.embedded_memory(
        "The API doesn't always returns JSON for every request we send",
        MemoryKind::Learnings,
        Impact::Medium,
    );

    let mut config = DreamConfig::default();
    config.n3_contradiction_threshold = 0.6;
    let runner = DreamRunner::new(&f.store, config, f.diary.clone(), &f.journal_dir);

    let first = runner.dream(&f.agent.id, None).unwrap();
    let n3 = first.n3.expect("n3 ran");
    assert_eq!(n3.contradictions_found, 1);

    let queued: Vec<_> = f
        .store
        .get_open_dissonances(&f.agent.id)
        .unwrap()
        .into_iter()
        .filter(|d| d.kind == DissonanceKind::Contradiction)
        .collect();
    assert_eq!(queued.len(), 1);
    assert!(queued[0].memory_id_b.is_some());

    // A second full dream finds the same candidate but queues nothing new
    let second = runner.dream(&f.agent.id, None).unwrap();
    let n3 = second.n3.expect("n3 ran");
    assert_eq!(n3.dissonance_queue_additions, 0);

    let requeued: Vec<_> = f
        .store
        .get_open_dissonances(&f.agent.id)
        .unwrap()
        .into_iter()
        .filter(|d| d.kind == DissonanceKind::Contradiction)
        .collect();
    assert_eq!(requeued.len(), 1);
}

#[test]
fn n2_rerun_discovers_no_new_links() {
    let f = EngineFixture::new();
    f.embedded_memory(
        "noted the login flow timing out on slow connections",
        MemoryKind::Learnings,
        Impact::Medium,
    );
    f.embedded_memory(
        "following up on the login flow timing out, the retry budget was zero",
        MemoryKind::Learnings,
        Impact::Medium,
    );

    let mut config = DreamConfig::default();
    config.n2_similarity_threshold = 0.3;
    config.stages = vec![DreamStage::N2];
    let runner = DreamRunner::new(&f.store, config, f.diary.clone(), &f.journal_dir);

    let first = runner.dream(&f.agent.id, None).unwrap();
    assert!(first.n2.unwrap().new_links_found >= 1);

    let second = runner.dream(&f.agent.id, None).unwrap();
    assert_eq!(second.n2.unwrap().new_links_found, 0);
}

#[test]
fn crash_recovery_resumes_from_n3_with_n2_intact() {
    let f = EngineFixture::new();
    f.embedded_memory(
        "material for the interrupted dream",
        MemoryKind::Learnings,
        Impact::Medium,
    );

    // Simulate a crash: N2 checkpointed, then the process died inside N3
    let session = f.store.start_dream_session(&f.agent.id, None).unwrap();
    let n2_checkpoint = serde_json::to_string(&N2Result {
        new_links_found: 3,
        links: vec![],
        impact_adjustments: vec![],
        duration_seconds: 0.2,
        memories_processed: 3,
    })
    .unwrap();
    f.store
        .update_dream_state(
            &session.id,
            DreamState::N2Complete,
            Some(&n2_checkpoint),
            None,
            None,
        )
        .unwrap();
    f.store
        .update_dream_state(&session.id, DreamState::N3Running, None, None, None)
        .unwrap();

    // A fresh dream refuses while the wreck is there
    let err = runner(&f).dream(&f.agent.id, None).unwrap_err();
    assert!(err.to_string().contains("Incomplete dream session"));

    // Resume replays N3 and REM; the N2 checkpoint is byte-identical
    let outcome = runner(&f).resume(&f.agent.id, None).unwrap();
    assert_eq!(outcome.session_id, session.id);
    assert_eq!(outcome.n2.as_ref().unwrap().new_links_found, 3);
    assert!(outcome.n3.is_some());
    assert!(outcome.rem.is_some());

    let finished = f.store.get_dream_session(&session.id).unwrap().unwrap();
    assert_eq!(finished.state, DreamState::Complete);
    assert_eq!(finished.n2_result_json.as_deref(), Some(n2_checkpoint.as_str()));
    assert!(finished.n3_result_json.is_some());
    assert!(finished.rem_result_json.is_some());
}

#[test]
fn completed_sessions_age_out_of_active_lookup() {
    let f = EngineFixture::new();

    let outcome = runner(&f).dream(&f.agent.id, None).unwrap();
    assert!(
        f.store
            .get_active_dream_session(&f.agent.id, None)
            .unwrap()
            .is_none()
    );

    // Retention sweep with a negative window removes even fresh COMPLETE rows
    let removed = f.store.cleanup_old_dream_sessions(-1).unwrap();
    assert_eq!(removed, 1);
    assert!(
        f.store
            .get_dream_session(&outcome.session_id)
            .unwrap()
            .is_none()
    );
}

#[test]
fn rem_journal_contains_materials_and_reflection_sections() {
    let f = EngineFixture::new();
    f.embedded_memory(
        "I wonder whether decay should respect pinned memories",
        MemoryKind::Learnings,
        Impact::Medium,
    );
    f.diary
        .write_entry(
            chrono::Utc::now(),
            "evening",
            "# Evening\nSat with the graph design; the chain walk felt right.",
        )
        .unwrap();

    let outcome = runner(&f).dream(&f.agent.id, None).unwrap();
    let rem = outcome.rem.unwrap();
    assert_eq!(rem.materials.recent_diaries_count, 1);
    assert!(
        rem.materials
            .incomplete_thoughts
            .iter()
            .any(|t| t.signal_type == "wonder")
    );

    let journal = std::fs::read_to_string(rem.dream_journal_path.unwrap()).unwrap();
    assert!(journal.contains("## Dream Materials"));
    assert!(journal.contains("What Lingers"));
    assert!(journal.contains("chain walk felt right"));
}

#[test]
fn scope_issue_flagged_for_misfiled_achievement() {
    let f = EngineFixture::new();

    // AGENT-region memory naming the known project with a version+achievement
    let memory = Memory::new(
        &f.agent.id,
        Region::Agent,
        None,
        MemoryKind::Achievements,
        "Released hailstorm v2.1.0 and completed the ingestion rework",
        Impact::Medium,
    );
    f.store.save_memory(&memory).unwrap();

    let outcome = runner(&f).dream(&f.agent.id, None).unwrap();
    let n3 = outcome.n3.unwrap();
    assert_eq!(n3.scope_issues_found, 1);
    assert_eq!(n3.scope_issues[0].suggested_region, "PROJECT");

    let issues = f.store.get_open_scope_issues(&f.agent.id).unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].memory_id_a, memory.id);
}
