//! Project fingerprinting
//!
//! Builds a semantic vector for "what this project is about" from README,
//! metadata, and recent commits, then retrieves PROJECT-scoped memories by
//! similarity to it. AGENT memories benefit from recency, but project rules
//! persist regardless of age - a constraint recorded two months ago must
//! surface as readily as one from two days ago.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::embeddings::{EmbeddingError, TextEmbedder, find_similar};
use crate::memory::{Memory, Region};
use crate::session::git::get_recent_commits;
use crate::storage::Storage;

/// README filenames, in priority order.
const README_FILES: &[&str] = &["README.md", "README.rst", "README.txt", "README"];

/// Metadata files mapped to a project type.
const METADATA_TYPES: &[(&str, &str)] = &[
    ("pyproject.toml", "python"),
    ("setup.py", "python"),
    ("requirements.txt", "python"),
    ("package.json", "node"),
    ("Cargo.toml", "rust"),
    ("go.mod", "go"),
    ("pom.xml", "java"),
    ("build.gradle", "java"),
    ("Gemfile", "ruby"),
    ("composer.json", "php"),
];

/// Maximum characters taken from the README.
const MAX_README_CHARS: usize = 2000;

/// Number of recent commit subjects to include.
const RECENT_COMMITS_COUNT: usize = 10;

/// Default similarity threshold for matching PROJECT memories.
pub const PROJECT_MEMORY_THRESHOLD: f32 = 0.35;

/// A semantic fingerprint of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFingerprint {
    pub project_name: String,
    pub readme_excerpt: Option<String>,
    pub recent_commits: Vec<String>,
    /// e.g. "python", "node", "rust"
    pub metadata_type: Option<String>,
    embedding: Vec<f32>,
}

impl ProjectFingerprint {
    /// Build a fingerprint from a project directory and embed it.
    pub fn from_directory(
        project_dir: &Path,
        embedder: &dyn TextEmbedder,
    ) -> Result<Self, EmbeddingError> {
        let project_name = project_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let readme_excerpt = extract_readme(project_dir);
        let metadata_type = detect_project_type(project_dir);
        let recent_commits = get_recent_commits(RECENT_COMMITS_COUNT, project_dir)
            .into_iter()
            .map(|c| c.subject)
            .filter(|s| !s.is_empty())
            .collect();

        let mut fingerprint = Self {
            project_name,
            readme_excerpt,
            recent_commits,
            metadata_type,
            embedding: Vec::new(),
        };
        fingerprint.embedding = embedder.embed(&fingerprint.to_text())?;
        Ok(fingerprint)
    }

    /// The fixed-format text the fingerprint embedding is computed from.
    pub fn to_text(&self) -> String {
        let mut parts = vec![format!("Project: {}", self.project_name)];

        if let Some(metadata_type) = &self.metadata_type {
            parts.push(format!("Type: {metadata_type} project"));
        }
        if let Some(excerpt) = &self.readme_excerpt {
            parts.push(format!("Description: {excerpt}"));
        }
        if !self.recent_commits.is_empty() {
            let subjects: Vec<&str> = self
                .recent_commits
                .iter()
                .take(5)
                .map(String::as_str)
                .collect();
            parts.push(format!("Recent work: {}", subjects.join(" | ")));
        }

        parts.join("\n")
    }

    /// The cached fingerprint vector.
    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    /// Find PROJECT-scoped memories semantically relevant to this project,
    /// in similarity order.
    pub fn find_relevant_memories(
        &self,
        store: &Storage,
        agent_id: &str,
        project_id: &str,
        limit: usize,
        threshold: f32,
    ) -> crate::storage::Result<Vec<Memory>> {
        let candidates = store.get_memories_with_embeddings(
            agent_id,
            Some(project_id),
            Some(Region::Project),
            false,
        )?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<(String, Vec<f32>)> = candidates
            .into_iter()
            .map(|m| (m.id, m.embedding))
            .collect();
        let ranked = find_similar(&self.embedding, &pairs, limit, threshold);

        let mut memories = Vec::with_capacity(ranked.len());
        for result in ranked {
            if let Some(memory) = store.get_memory(&result.item)? {
                memories.push(memory);
            }
        }
        Ok(memories)
    }
}

/// First ~2000 chars of the README, preferring a paragraph boundary.
fn extract_readme(project_dir: &Path) -> Option<String> {
    for readme_name in README_FILES {
        let path = project_dir.join(readme_name);
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };

        let mut end = MAX_README_CHARS.min(content.len());
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        let mut excerpt = &content[..end];

        if content.len() > MAX_README_CHARS {
            if let Some(last_para) = excerpt.rfind("\n\n") {
                if last_para > MAX_README_CHARS / 2 {
                    excerpt = &excerpt[..last_para];
                }
            }
        }
        return Some(excerpt.trim().to_string());
    }
    None
}

/// Detect the project type from well-known metadata files.
fn detect_project_type(project_dir: &Path) -> Option<String> {
    METADATA_TYPES
        .iter()
        .find(|(filename, _)| project_dir.join(filename).exists())
        .map(|(_, project_type)| (*project_type).to_string())
}
