//! REM - divergent material gathering
//!
//! The poet finding unexpected rhymes: sample distant memory pairs, surface
//! incomplete thoughts, mine recurring themes and diary excerpts, and write
//! a dream-journal template. The engine only gathers materials; the actual
//! reflection happens conversationally, outside the core.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use rand::prelude::IndexedRandom;

use crate::diary::{DiaryStore, excerpt};
use crate::embeddings::cosine_similarity;
use crate::memory::TemporalMemory;
use crate::storage::{Result, Storage};

use super::types::{DiarySnippet, DreamConfig, DreamMaterials, IncompleteThought, MemoryPair, RemResult};

/// Distant pairs kept per dream.
const MAX_DISTANT_PAIRS: usize = 5;

/// Similarity floor for a pair to still count as connected at all.
const MIN_PAIR_SIMILARITY: f32 = 0.1;

/// Random older memories mixed into the dream.
const RANDOM_OLD_MEMORIES: usize = 10;

/// Random older diary entries mixed in.
const RANDOM_OLD_DIARIES: usize = 3;

/// Incomplete thoughts kept per dream.
const MAX_INCOMPLETE_THOUGHTS: usize = 10;

/// Recurring themes kept per dream.
const MAX_THEMES: usize = 10;

/// Minimum occurrences for a word to count as a theme.
const THEME_MIN_COUNT: usize = 3;

/// Diary excerpts included in the journal.
const MAX_DIARY_SNIPPETS: usize = 5;

/// Substrings marking an unfinished thought, with their signal tags.
const THOUGHT_SIGNALS: &[(&str, &str)] = &[
    ("i wonder", "wonder"),
    ("todo:", "todo"),
    ("need to research", "research"),
    ("not sure", "uncertain"),
    ("unclear", "unclear"),
    ("what if", "counterfactual"),
    ("should explore", "explore"),
    ("might be worth", "potential"),
    ("?", "question"),
];

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "to", "of", "and", "in", "that", "it", "for",
    "with", "on", "as", "at", "by", "this", "from", "be", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "can", "must", "shall", "being",
    "been", "am", "or", "if", "but", "not", "no", "so", "than", "too", "very", "just", "also",
    "only", "then", "now", "here", "there", "when", "where", "why", "how", "what", "which", "who",
    "whom", "its", "my", "your", "our", "their", "his", "her", "we", "they", "you", "me", "him",
    "them", "us", "i", "about", "into", "through",
];

/// Run the REM gathering stage: collect materials and write the journal
/// template.
pub fn run_rem_dreaming(
    store: &Storage,
    agent_id: &str,
    project_id: Option<&str>,
    config: &DreamConfig,
    diary: &DiaryStore,
    journal_dir: &Path,
    since_last_dream: Option<DateTime<Utc>>,
) -> Result<RemResult> {
    let start = Instant::now();
    tracing::info!("REM: entering divergent gathering");

    let materials = gather_dream_materials(store, agent_id, project_id, config, diary, since_last_dream)?;
    let journal_path = write_dream_journal(&materials, agent_id, journal_dir)?;

    tracing::info!(
        pairs = materials.distant_pairs.len(),
        thoughts = materials.incomplete_thoughts.len(),
        themes = materials.recurring_themes.len(),
        journal = %journal_path.display(),
        "REM complete"
    );

    Ok(RemResult {
        materials,
        dream_journal_path: Some(journal_path.to_string_lossy().into_owned()),
        duration_seconds: start.elapsed().as_secs_f64(),
    })
}

/// Gather raw materials: recent memories plus a random sample of older ones
/// (the intentional "weird dream" recombination), recent plus random diary
/// entries, distant pairs, incomplete thoughts, and recurring themes.
pub fn gather_dream_materials(
    store: &Storage,
    agent_id: &str,
    project_id: Option<&str>,
    config: &DreamConfig,
    diary: &DiaryStore,
    since_last_dream: Option<DateTime<Utc>>,
) -> Result<DreamMaterials> {
    let all_embedded = store.get_memories_with_temporal_context(agent_id, project_id, false)?;

    let (memory_cutoff, diary_cutoff) = match since_last_dream {
        Some(cutoff) => (cutoff, cutoff),
        None => (
            Utc::now() - Duration::days(config.project_lookback_days),
            Utc::now() - Duration::days(config.diary_lookback_days),
        ),
    };

    let (recent, older): (Vec<TemporalMemory>, Vec<TemporalMemory>) = all_embedded
        .into_iter()
        .partition(|m| m.created_at >= memory_cutoff);

    let random_old = sample_memories(&older, RANDOM_OLD_MEMORIES);
    let recent_count = recent.len();
    let random_old_count = random_old.len();

    let mut dream_set = recent;
    dream_set.extend(random_old);

    let recent_diaries = diary.load_recent_entries(diary_cutoff);
    let random_old_diaries = diary.load_random_older_entries(RANDOM_OLD_DIARIES, diary_cutoff);
    let recent_diaries_count = recent_diaries.len();
    let random_old_diaries_count = random_old_diaries.len();

    let mut diary_entries = recent_diaries;
    diary_entries.extend(random_old_diaries);

    let distant_pairs = find_distant_pairs(&dream_set, config.rem_association_distance);
    let incomplete_thoughts = find_incomplete_thoughts(&dream_set);
    let recurring_themes = extract_recurring_themes(&dream_set, THEME_MIN_COUNT);

    let diary_snippets: Vec<DiarySnippet> = diary_entries
        .iter()
        .take(MAX_DIARY_SNIPPETS)
        .map(|(date, content)| DiarySnippet {
            date: date.clone(),
            excerpt: excerpt(content, 200),
        })
        .collect();

    Ok(DreamMaterials {
        distant_pairs,
        incomplete_thoughts,
        recurring_themes,
        diary_snippets,
        total_memories: dream_set.len(),
        total_diary_entries: diary_entries.len(),
        recent_memories_count: recent_count,
        random_old_memories_count: random_old_count,
        recent_diaries_count,
        random_old_diaries_count,
    })
}

fn sample_memories(memories: &[TemporalMemory], limit: usize) -> Vec<TemporalMemory> {
    if memories.len() <= limit {
        return memories.to_vec();
    }
    let mut rng = rand::rng();
    memories.choose_multiple(&mut rng, limit).cloned().collect()
}

/// Randomly sample pairs, keeping those in the "distant but connected"
/// band, lowest similarity first.
fn find_distant_pairs(memories: &[TemporalMemory], threshold: f32) -> Vec<MemoryPair> {
    if memories.len() < 2 {
        return Vec::new();
    }

    let mut rng = rand::rng();
    let attempts = 50.min(memories.len() * 2);
    let mut pairs: Vec<MemoryPair> = Vec::new();

    for _ in 0..attempts {
        let picked = rand::seq::index::sample(&mut rng, memories.len(), 2);
        let a = &memories[picked.index(0)];
        let b = &memories[picked.index(1)];

        let similarity = cosine_similarity(&a.embedding, &b.embedding);
        if similarity > MIN_PAIR_SIMILARITY && similarity < threshold {
            pairs.push(MemoryPair {
                memory_a_id: a.id.clone(),
                memory_a_content: a.content.clone(),
                memory_b_id: b.id.clone(),
                memory_b_content: b.content.clone(),
                similarity,
            });
        }

        if pairs.len() >= MAX_DISTANT_PAIRS {
            break;
        }
    }

    pairs.sort_by(|a, b| {
        a.similarity
            .partial_cmp(&b.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    pairs.truncate(MAX_DISTANT_PAIRS);
    pairs
}

/// Scan memory contents for unfinished-thought signals, one per memory.
fn find_incomplete_thoughts(memories: &[TemporalMemory]) -> Vec<IncompleteThought> {
    let mut thoughts: Vec<IncompleteThought> = Vec::new();

    for memory in memories {
        let lower = memory.content.to_lowercase();
        for (signal, signal_type) in THOUGHT_SIGNALS {
            let Some(idx) = lower.find(signal) else {
                continue;
            };

            let start = floor_char_boundary(&memory.content, idx.saturating_sub(30));
            let end =
                floor_char_boundary(&memory.content, (idx + signal.len() + 100).min(memory.content.len()));
            let mut snippet = memory.content[start..end].trim().to_string();
            if start > 0 {
                snippet = format!("...{snippet}");
            }
            if end < memory.content.len() {
                snippet = format!("{snippet}...");
            }

            thoughts.push(IncompleteThought {
                memory_id: memory.id.clone(),
                snippet,
                signal_type: (*signal_type).to_string(),
            });
            break;
        }

        if thoughts.len() >= MAX_INCOMPLETE_THOUGHTS {
            break;
        }
    }

    thoughts
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Word-frequency themes: skip stopwords and short words, keep words seen
/// at least `min_count` times, most frequent first.
fn extract_recurring_themes(memories: &[TemporalMemory], min_count: usize) -> Vec<String> {
    let mut frequency: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for memory in memories {
        for word in memory.content.to_lowercase().split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            if word.len() <= 4 || STOPWORDS.contains(&word) {
                continue;
            }
            *frequency.entry(word.to_string()).or_default() += 1;
        }
    }

    let mut themes: Vec<(String, usize)> = frequency
        .into_iter()
        .filter(|(_, count)| *count >= min_count)
        .collect();
    themes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    themes.truncate(MAX_THEMES);
    themes.into_iter().map(|(word, _)| word).collect()
}

/// Write the dream journal template: auto-filled materials up top, empty
/// reflection sections below.
fn write_dream_journal(
    materials: &DreamMaterials,
    agent_id: &str,
    journal_dir: &Path,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(journal_dir)?;

    let now = Utc::now();
    let today = now.format("%Y-%m-%d");
    let path = journal_dir.join(format!("{today}_dream_{}.md", now.format("%H%M")));

    let mut composition: Vec<String> = Vec::new();
    if materials.recent_memories_count > 0 {
        composition.push(format!("{} new memories", materials.recent_memories_count));
    }
    if materials.random_old_memories_count > 0 {
        composition.push(format!(
            "{} random old memories",
            materials.random_old_memories_count
        ));
    }
    if materials.recent_diaries_count > 0 {
        composition.push(format!("{} new diary entries", materials.recent_diaries_count));
    }
    if materials.random_old_diaries_count > 0 {
        composition.push(format!(
            "{} random old diaries",
            materials.random_old_diaries_count
        ));
    }
    let composition = if composition.is_empty() {
        "wandering through the archives".to_string()
    } else {
        composition.join(" + ")
    };

    let mut lines: Vec<String> = vec![
        format!("# Dream Journal - {today}"),
        String::new(),
        format!("*Dream session at {}*", now.format("%H:%M")),
        String::new(),
        "---".into(),
        String::new(),
        "## Dream Materials".into(),
        String::new(),
        format!("*Dream composition: {composition}*"),
        String::new(),
    ];

    if !materials.distant_pairs.is_empty() {
        lines.push("### Memory Pairs to Connect".into());
        lines.push(String::new());
        lines.push("*These memories are semantically distant - what unexpected connections exist?*".into());
        lines.push(String::new());
        for (i, pair) in materials.distant_pairs.iter().enumerate() {
            lines.push(format!("**Pair {}** (similarity: {:.2})", i + 1, pair.similarity));
            lines.push(String::new());
            lines.push(format!("> **A:** {}", preview(&pair.memory_a_content, 300)));
            lines.push(String::new());
            lines.push(format!("> **B:** {}", preview(&pair.memory_b_content, 300)));
            lines.push(String::new());
        }
    }

    if !materials.incomplete_thoughts.is_empty() {
        lines.push("### Incomplete Thoughts".into());
        lines.push(String::new());
        lines.push("*These thoughts were left unfinished - what's the answer?*".into());
        lines.push(String::new());
        for thought in materials.incomplete_thoughts.iter().take(5) {
            lines.push(format!("- **[{}]** {}", thought.signal_type, thought.snippet));
        }
        lines.push(String::new());
    }

    if !materials.recurring_themes.is_empty() {
        lines.push("### Recurring Themes".into());
        lines.push(String::new());
        lines.push(format!(
            "*Words that keep appearing: {}*",
            materials.recurring_themes.join(", ")
        ));
        lines.push(String::new());
    }

    if !materials.diary_snippets.is_empty() {
        lines.push("### Recent Diary Excerpts".into());
        lines.push(String::new());
        for snippet in &materials.diary_snippets {
            lines.push(format!("**{}:**", snippet.date));
            lines.push(format!("> {}", snippet.excerpt));
            lines.push(String::new());
        }
    }

    for section in [
        ("Distant Connections", "What unexpected links exist between the memory pairs above?"),
        ("Questions That Emerged", "What new curiosities arose from these materials?"),
        ("Self-Observations", "What patterns show up in how I think, feel, or work?"),
        ("What Lingers", "The raw residue - what stays after this dream?"),
    ] {
        lines.push("---".into());
        lines.push(String::new());
        lines.push(format!("### {}", section.0));
        lines.push(String::new());
        lines.push(format!("*{}*", section.1));
        lines.push(String::new());
        lines.push("[To be filled during reflection...]".into());
        lines.push(String::new());
    }

    lines.push("---".into());
    lines.push(String::new());
    lines.push(format!("*Agent {}*", &agent_id[..agent_id.len().min(8)]));
    lines.push(String::new());

    std::fs::write(&path, lines.join("\n"))?;
    Ok(path)
}

fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() > max_chars {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        content.to_string()
    }
}
