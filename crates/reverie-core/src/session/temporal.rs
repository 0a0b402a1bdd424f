//! Temporal cue parsing - "time as space"
//!
//! Translates temporal language into spatial query coordinates:
//!
//! - "yesterday" -> a timestamp window
//! - "last session" -> a specific session id
//! - "during the last commit" -> a git commit hash
//!
//! The resulting [`TemporalCoordinate`] fields are AND-conjoined into a
//! store query by the caller.

use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::storage::{Result, Storage};

use super::git::get_recent_commits;
use super::{get_current_session_id, get_previous_session_id};

/// Kinds of temporal cues we can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemporalCueType {
    /// "last session", "this session"
    Session,
    /// "yesterday", "last week", "recently"
    RelativeTime,
    /// "during the last commit", "on branch X"
    GitEvent,
}

/// Spatial coordinates derived from a temporal cue.
///
/// A cue that cannot resolve (e.g. "last session" with no previous session)
/// leaves the relevant field None; the caller decides whether that is a
/// no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalCoordinate {
    pub cue_type: TemporalCueType,
    /// The matched text
    pub original_text: String,

    // Session coordinates
    pub session_id: Option<String>,
    pub is_current_session: bool,

    // Time-range coordinates (UTC)
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    // Git coordinates
    pub git_commit: Option<String>,
    pub git_branch: Option<String>,
}

impl TemporalCoordinate {
    fn new(cue_type: TemporalCueType, original_text: &str) -> Self {
        Self {
            cue_type,
            original_text: original_text.to_string(),
            session_id: None,
            is_current_session: false,
            start_time: None,
            end_time: None,
            git_commit: None,
            git_branch: None,
        }
    }

    /// Whether any query filter is set.
    pub fn has_filters(&self) -> bool {
        self.session_id.is_some()
            || self.start_time.is_some()
            || self.end_time.is_some()
            || self.git_commit.is_some()
            || self.git_branch.is_some()
    }
}

/// Resolution inputs gathered once per message: session ids from settings
/// and commit hashes from the repository.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemporalContext {
    pub current_session_id: Option<String>,
    pub previous_session_id: Option<String>,
    /// HEAD commit (short hash)
    pub head_commit: Option<String>,
    /// Second-most-recent commit (short hash)
    pub previous_commit: Option<String>,
}

impl TemporalContext {
    /// Gather resolution context from the store and an optional repository.
    pub fn gather(
        store: &Storage,
        agent_id: Option<&str>,
        project_id: Option<&str>,
        repo_dir: Option<&Path>,
    ) -> Result<Self> {
        let current_session_id = get_current_session_id(store)?;
        let previous_session_id = get_previous_session_id(store, agent_id, project_id)?;

        let (head_commit, previous_commit) = match repo_dir {
            Some(dir) => {
                let commits = get_recent_commits(2, dir);
                let head = commits.first().map(|c| c.hash.clone());
                // "the last commit" means the one before HEAD when it exists
                let previous = commits.get(1).or(commits.first()).map(|c| c.hash.clone());
                (head, previous)
            }
            None => (None, None),
        };

        Ok(Self {
            current_session_id,
            previous_session_id,
            head_commit,
            previous_commit,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cue {
    LastSession,
    CurrentSession,
    LastCommit,
    CurrentCommit,
    GitBranch,
    GitMain,
    GitMaster,
    Yesterday,
    LastWeek,
    ThisWeek,
    Recent,
    FewDaysAgo,
    LastMonth,
    EarlierToday,
}

/// Ordered pattern table. Session and git patterns come before the broad
/// relative-time words so "earlier today" wins over bare "earlier".
static TEMPORAL_PATTERNS: LazyLock<Vec<(Regex, Cue)>> = LazyLock::new(|| {
    [
        // Session patterns
        (
            r"(?:as we|when we|what we)?\s*(?:discussed|mentioned|talked about|noted|worked on)\s*(?:last|previous)\s*session",
            Cue::LastSession,
        ),
        (r"(?:in\s+)?(?:the\s+)?(?:last|previous)\s+session", Cue::LastSession),
        (
            r"(?:during|in)\s+(?:this|our)\s+(?:current\s+)?session",
            Cue::CurrentSession,
        ),
        (r"earlier\s+(?:today|this session)", Cue::CurrentSession),
        // Git event patterns
        (
            r"(?:during|while|when|at)\s+(?:the\s+)?(?:last|previous|recent)\s+commit",
            Cue::LastCommit,
        ),
        (r"(?:on|for)\s+(?:this|the)\s+commit", Cue::CurrentCommit),
        (
            r"(?:while|when)\s+(?:working on|implementing|fixing|building)\s+(?:that|the)\s+commit",
            Cue::LastCommit,
        ),
        (
            r#"(?:on|in)\s+(?:the\s+)?(?:branch|feature)\s+['"]?([^\s'"]+)"#,
            Cue::GitBranch,
        ),
        (r"(?:on|in)\s+main(?:\s+branch)?", Cue::GitMain),
        (r"(?:on|in)\s+master(?:\s+branch)?", Cue::GitMaster),
        // Relative time patterns
        (r"yesterday", Cue::Yesterday),
        (r"last\s+week", Cue::LastWeek),
        (r"this\s+week", Cue::ThisWeek),
        (r"recently", Cue::Recent),
        (r"a\s+few\s+days\s+ago", Cue::FewDaysAgo),
        (r"last\s+month", Cue::LastMonth),
        (r"earlier", Cue::EarlierToday),
    ]
    .iter()
    .map(|(pattern, cue)| (Regex::new(pattern).expect("temporal pattern compiles"), *cue))
    .collect()
});

fn midnight(moment: DateTime<Utc>) -> DateTime<Utc> {
    moment
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}

fn resolve_cue(
    cue: Cue,
    matched: &str,
    branch_capture: Option<&str>,
    now: DateTime<Utc>,
    ctx: &TemporalContext,
) -> TemporalCoordinate {
    match cue {
        Cue::LastSession => TemporalCoordinate {
            session_id: ctx.previous_session_id.clone(),
            ..TemporalCoordinate::new(TemporalCueType::Session, matched)
        },
        Cue::CurrentSession => TemporalCoordinate {
            session_id: ctx.current_session_id.clone(),
            is_current_session: true,
            ..TemporalCoordinate::new(TemporalCueType::Session, matched)
        },
        Cue::LastCommit => TemporalCoordinate {
            git_commit: ctx.previous_commit.clone(),
            ..TemporalCoordinate::new(TemporalCueType::GitEvent, matched)
        },
        Cue::CurrentCommit => TemporalCoordinate {
            git_commit: ctx.head_commit.clone(),
            ..TemporalCoordinate::new(TemporalCueType::GitEvent, matched)
        },
        Cue::GitBranch => TemporalCoordinate {
            git_branch: branch_capture.map(String::from),
            ..TemporalCoordinate::new(TemporalCueType::GitEvent, matched)
        },
        Cue::GitMain => TemporalCoordinate {
            git_branch: Some("main".into()),
            ..TemporalCoordinate::new(TemporalCueType::GitEvent, matched)
        },
        Cue::GitMaster => TemporalCoordinate {
            git_branch: Some("master".into()),
            ..TemporalCoordinate::new(TemporalCueType::GitEvent, matched)
        },
        Cue::Yesterday => {
            let start = midnight(now - Duration::days(1));
            TemporalCoordinate {
                start_time: Some(start),
                end_time: Some(start + Duration::days(1)),
                ..TemporalCoordinate::new(TemporalCueType::RelativeTime, matched)
            }
        }
        Cue::LastWeek => TemporalCoordinate {
            start_time: Some(now - Duration::days(7)),
            end_time: Some(now),
            ..TemporalCoordinate::new(TemporalCueType::RelativeTime, matched)
        },
        Cue::ThisWeek => {
            let days_since_monday = now.weekday().num_days_from_monday() as i64;
            let start = midnight(now - Duration::days(days_since_monday));
            TemporalCoordinate {
                start_time: Some(start),
                end_time: Some(now),
                ..TemporalCoordinate::new(TemporalCueType::RelativeTime, matched)
            }
        }
        Cue::Recent => TemporalCoordinate {
            start_time: Some(now - Duration::hours(48)),
            end_time: Some(now),
            ..TemporalCoordinate::new(TemporalCueType::RelativeTime, matched)
        },
        Cue::FewDaysAgo => TemporalCoordinate {
            start_time: Some(now - Duration::days(5)),
            end_time: Some(now - Duration::days(1)),
            ..TemporalCoordinate::new(TemporalCueType::RelativeTime, matched)
        },
        Cue::LastMonth => TemporalCoordinate {
            start_time: Some(now - Duration::days(30)),
            end_time: Some(now),
            ..TemporalCoordinate::new(TemporalCueType::RelativeTime, matched)
        },
        Cue::EarlierToday => TemporalCoordinate {
            start_time: Some(midnight(now)),
            end_time: Some(now),
            ..TemporalCoordinate::new(TemporalCueType::RelativeTime, matched)
        },
    }
}

/// Parse text for the first temporal cue, in pattern-table order.
pub fn parse_temporal_cue(
    text: &str,
    now: DateTime<Utc>,
    ctx: &TemporalContext,
) -> Option<TemporalCoordinate> {
    let lowered = text.to_lowercase();

    for (pattern, cue) in TEMPORAL_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(&lowered) {
            let matched = captures.get(0).map(|m| m.as_str()).unwrap_or_default();
            let branch = captures.get(1).map(|m| m.as_str());
            return Some(resolve_cue(*cue, matched, branch, now, ctx));
        }
    }

    None
}

/// Find every temporal cue in a text, in pattern-table order.
pub fn find_all_temporal_cues(
    text: &str,
    now: DateTime<Utc>,
    ctx: &TemporalContext,
) -> Vec<TemporalCoordinate> {
    let lowered = text.to_lowercase();
    let mut coordinates = Vec::new();

    for (pattern, cue) in TEMPORAL_PATTERNS.iter() {
        for captures in pattern.captures_iter(&lowered) {
            let matched = captures.get(0).map(|m| m.as_str()).unwrap_or_default();
            let branch = captures.get(1).map(|m| m.as_str());
            coordinates.push(resolve_cue(*cue, matched, branch, now, ctx));
        }
    }

    coordinates
}
