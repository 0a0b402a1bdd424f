//! Storage layer
//!
//! One SQLite file holds everything: agents, projects, memories (with
//! embeddings and tiers inline), links, settings, the curiosity and
//! dissonance queues, and dream-session FSM state.

mod curiosity;
mod dissonance;
mod dream_state;
pub mod migrations;
mod sqlite;

pub use curiosity::{Curiosity, CuriosityStatus};
pub use dissonance::{Dissonance, DissonanceKind, DissonanceStatus};
pub use migrations::{MigrationError, MigrationOutcome, SCHEMA_VERSION};
pub use sqlite::{MemoryLimits, Result, Storage, StorageError, escape_like_pattern};
