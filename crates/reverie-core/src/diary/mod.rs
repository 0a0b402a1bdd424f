//! Diary store
//!
//! A keyed document store of markdown diary entries on disk, named
//! `YYYY-MM-DD_title.md`. REM reads recent entries for pattern mining and
//! samples random older ones for dream recombination.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::prelude::IndexedRandom;

/// A diary entry: (filename stem, full content).
pub type DiaryEntry = (String, String);

/// Filesystem-backed diary store.
#[derive(Debug, Clone)]
pub struct DiaryStore {
    dir: PathBuf,
}

impl DiaryStore {
    /// Open a diary store at `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write an entry for a date, returning its path.
    pub fn write_entry(
        &self,
        date: DateTime<Utc>,
        title: &str,
        content: &str,
    ) -> std::io::Result<PathBuf> {
        let slug: String = title
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        let path = self
            .dir
            .join(format!("{}_{slug}.md", date.format("%Y-%m-%d")));
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Entries dated at or after `since`, newest first.
    pub fn load_recent_entries(&self, since: DateTime<Utc>) -> Vec<DiaryEntry> {
        let cutoff = since.format("%Y-%m-%d").to_string();
        let mut entries: Vec<DiaryEntry> = self
            .dated_entries()
            .into_iter()
            .filter(|(stem, _)| stem[..10] >= cutoff[..])
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        entries
    }

    /// Up to `limit` random entries dated before `exclude_after`.
    pub fn load_random_older_entries(
        &self,
        limit: usize,
        exclude_after: DateTime<Utc>,
    ) -> Vec<DiaryEntry> {
        let cutoff = exclude_after.format("%Y-%m-%d").to_string();
        let older: Vec<DiaryEntry> = self
            .dated_entries()
            .into_iter()
            .filter(|(stem, _)| stem[..10] < cutoff[..])
            .collect();

        if older.len() <= limit {
            return older;
        }
        let mut rng = rand::rng();
        older.choose_multiple(&mut rng, limit).cloned().collect()
    }

    /// All entries whose filename starts with a `YYYY-MM-DD` date.
    fn dated_entries(&self) -> Vec<DiaryEntry> {
        let Ok(read_dir) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        let mut entries = Vec::new();
        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !has_date_prefix(stem) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            entries.push((stem.to_string(), content));
        }
        entries
    }
}

fn has_date_prefix(stem: &str) -> bool {
    let bytes = stem.as_bytes();
    bytes.len() >= 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && stem[..10]
            .chars()
            .enumerate()
            .all(|(i, c)| matches!(i, 4 | 7) || c.is_ascii_digit())
}

/// A prose excerpt of an entry: headings and frontmatter skipped, collapsed
/// to one line, truncated to `max_len`.
pub fn excerpt(content: &str, max_len: usize) -> String {
    let text: String = content
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#') && !trimmed.starts_with("---")
        })
        .collect::<Vec<_>>()
        .join(" ");

    if text.chars().count() > max_len {
        let cut: String = text.chars().take(max_len).collect();
        format!("{cut}...")
    } else {
        text
    }
}
