//! Shared fixtures for the end-to-end journey tests.

use std::path::PathBuf;

use reverie_core::prelude::*;
use reverie_core::{DiaryStore, TextEmbedder};
use tempfile::TempDir;

/// A throwaway engine environment: store, agent, project, diary, journal
/// directory, all rooted in one temp dir.
pub struct EngineFixture {
    _dir: TempDir,
    pub store: Storage,
    pub agent: Agent,
    pub project: Project,
    pub diary: DiaryStore,
    pub journal_dir: PathBuf,
}

impl EngineFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Storage::open(dir.path().join("memories.db")).expect("open store");

        let agent = Agent::new("agent-e2e", "Reverie");
        store.save_agent(&agent).expect("save agent");

        let project = Project::new("proj-e2e", "hailstorm", "/tmp/hailstorm");
        store.save_project(&project).expect("save project");

        let diary = DiaryStore::new(dir.path().join("diary")).expect("diary dir");
        let journal_dir = dir.path().join("dream_journal");

        Self {
            _dir: dir,
            store,
            agent,
            project,
            diary,
            journal_dir,
        }
    }

    /// Save an agent-region memory with a stub embedding.
    pub fn embedded_memory(&self, content: &str, kind: MemoryKind, impact: Impact) -> Memory {
        let memory = Memory::new(&self.agent.id, Region::Agent, None, kind, content, impact);
        self.store.save_memory(&memory).expect("save memory");
        let embedding = StubEmbedder.embed(content).expect("embed");
        self.store
            .save_embedding(&memory.id, &embedding)
            .expect("save embedding");
        memory
    }
}

impl Default for EngineFixture {
    fn default() -> Self {
        Self::new()
    }
}
