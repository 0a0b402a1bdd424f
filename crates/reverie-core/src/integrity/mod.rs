//! Memory integrity checking
//!
//! Scans an agent's memories for invariant violations at session end, so
//! corruption is caught before it compounds across sessions. Enum validity
//! is enforced by the store layer on load; the checker covers what the type
//! system cannot: missing fields, out-of-range confidence, orphaned
//! references, and signature mismatches.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::memory::signing::verify_signature;
use crate::memory::{Memory, Region};
use crate::storage::{Result, Storage};

/// Severity of an integrity issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Data-loss risk
    Error,
    /// Recoverable
    Warning,
}

/// A single integrity issue found in a memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    /// First 8 chars of the memory id
    pub memory_id: String,
    pub field: String,
    pub issue: String,
    pub severity: Severity,
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        };
        write!(
            f,
            "[{severity}] {}: {} - {}",
            self.memory_id, self.field, self.issue
        )
    }
}

/// Summary of an integrity check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub total_checked: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

impl std::fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_healthy() {
            write!(f, "{} memories checked, all healthy", self.total_checked)
        } else {
            write!(
                f,
                "{} memories checked: {} errors, {} warnings",
                self.total_checked,
                self.error_count(),
                self.warning_count()
            )
        }
    }
}

/// Validates memory integrity for an agent/project.
pub struct IntegrityChecker<'a> {
    store: &'a Storage,
}

impl<'a> IntegrityChecker<'a> {
    pub fn new(store: &'a Storage) -> Self {
        Self { store }
    }

    /// Check all non-superseded memories for an agent. With a project
    /// filter, the agent's cross-project (AGENT-region) memories are
    /// included as well.
    pub fn check_all(
        &self,
        agent_id: &str,
        project_id: Option<&str>,
        signing_key: Option<&str>,
    ) -> Result<IntegrityReport> {
        let mut memories =
            self.store
                .get_memories_for_agent(agent_id, None, project_id, None, false, None)?;

        if project_id.is_some() {
            let seen: HashSet<String> = memories.iter().map(|m| m.id.clone()).collect();
            let agent_wide = self.store.get_memories_for_agent(
                agent_id,
                Some(Region::Agent),
                None,
                None,
                false,
                None,
            )?;
            memories.extend(agent_wide.into_iter().filter(|m| !seen.contains(&m.id)));
        }

        let all_ids: HashSet<&str> = memories.iter().map(|m| m.id.as_str()).collect();

        let mut issues: Vec<IntegrityIssue> = Vec::new();
        for memory in &memories {
            check_memory(memory, &all_ids, signing_key, &mut issues);
        }

        Ok(IntegrityReport {
            total_checked: memories.len(),
            issues,
        })
    }
}

fn short_id(id: &str) -> String {
    id[..id.len().min(8)].to_string()
}

fn check_memory(
    memory: &Memory,
    all_ids: &HashSet<&str>,
    signing_key: Option<&str>,
    issues: &mut Vec<IntegrityIssue>,
) {
    if memory.agent_id.is_empty() {
        issues.push(IntegrityIssue {
            memory_id: short_id(&memory.id),
            field: "agent_id".into(),
            issue: "Missing required field".into(),
            severity: Severity::Error,
        });
    }

    if memory.content.is_empty() {
        issues.push(IntegrityIssue {
            memory_id: short_id(&memory.id),
            field: "content".into(),
            issue: "Empty content".into(),
            severity: Severity::Error,
        });
    }

    if !(0.0..=1.0).contains(&memory.confidence) {
        issues.push(IntegrityIssue {
            memory_id: short_id(&memory.id),
            field: "confidence".into(),
            issue: format!("Out of range [0.0, 1.0]: {}", memory.confidence),
            severity: Severity::Warning,
        });
    }

    if let Some(previous) = &memory.previous_memory_id {
        if !all_ids.contains(previous.as_str()) {
            issues.push(IntegrityIssue {
                memory_id: short_id(&memory.id),
                field: "previous_memory_id".into(),
                issue: format!("References non-existent memory: {}", short_id(previous)),
                severity: Severity::Warning,
            });
        }
    }

    if let Some(superseded_by) = &memory.superseded_by {
        if !all_ids.contains(superseded_by.as_str()) {
            issues.push(IntegrityIssue {
                memory_id: short_id(&memory.id),
                field: "superseded_by".into(),
                issue: format!("References non-existent memory: {}", short_id(superseded_by)),
                severity: Severity::Warning,
            });
        }
    }

    if let (Some(key), Some(_)) = (signing_key, &memory.signature) {
        if !verify_signature(memory, key) {
            issues.push(IntegrityIssue {
                memory_id: short_id(&memory.id),
                field: "signature".into(),
                issue: "Invalid signature - memory may have been tampered with".into(),
                severity: Severity::Error,
            });
        }
    }
}
