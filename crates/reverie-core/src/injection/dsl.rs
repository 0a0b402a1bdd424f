//! Memory DSL emitter
//!
//! The compact, line-oriented block the host agent reads at session start:
//!
//! ```text
//! [LTM:Anima]
//! ~EMOT:CRIT| @Matt collaborative, direct feedback
//! ~LEARN:MED|? sqlite WAL mode needs a checkpoint strategy
//! [/LTM]
//! ```
//!
//! One line per memory: kind tag, impact tag, a `?` marker for low
//! confidence, the (possibly truncated) content flattened to one line, and
//! a trailing warning glyph when the signature failed verification.

use crate::memory::Memory;

/// Confidence below which a memory line carries the `?` marker.
const LOW_CONFIDENCE: f64 = 0.7;

/// Glyph appended to records whose signature failed verification.
const UNTRUSTED_GLYPH: &str = " \u{26a0}";

/// Render a single memory line.
pub fn memory_line(memory: &Memory) -> String {
    let marker = if memory.confidence < LOW_CONFIDENCE { "?" } else { "" };
    let glyph = if memory.signature_valid == Some(false) {
        UNTRUSTED_GLYPH
    } else {
        ""
    };
    let content: String = memory
        .content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "~{}:{}|{marker} {content}{glyph}",
        memory.kind.dsl_tag(),
        memory.impact.dsl_tag(),
    )
}

/// A block of memories addressed to one agent.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlock {
    pub agent_name: String,
    pub memories: Vec<Memory>,
}

impl MemoryBlock {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            memories: Vec::new(),
        }
    }

    /// Emit the delimited block; empty string when there are no memories.
    pub fn to_dsl(&self) -> String {
        if self.memories.is_empty() {
            return String::new();
        }

        let mut lines = Vec::with_capacity(self.memories.len() + 2);
        lines.push(format!("[LTM:{}]", self.agent_name));
        for memory in &self.memories {
            lines.push(memory_line(memory));
        }
        lines.push("[/LTM]".to_string());
        lines.join("\n")
    }

    /// The header/footer overhead without any memory lines.
    pub fn frame(agent_name: &str) -> String {
        format!("[LTM:{agent_name}]\n[/LTM]")
    }
}
