//! Engine configuration
//!
//! One explicit structure per concern, loaded from a JSON file when present
//! and falling back to defaults field by field.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dream::types::DreamConfig;
use crate::storage::MemoryLimits;

/// Token budget settings for session-start injection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Host context window in tokens
    pub context_size: usize,
    /// Fraction of the window reserved for memories
    pub context_percent: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            context_size: 200_000,
            context_percent: 0.10,
        }
    }
}

impl BudgetConfig {
    /// The memory token budget.
    pub fn memory_budget(&self) -> usize {
        (self.context_size as f64 * self.context_percent) as usize
    }
}

/// Limits on the emitted hook output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    /// Byte cap on the emitted block
    pub max_output_bytes: usize,
    /// Display cap per memory's content
    pub max_memory_chars: usize,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            max_output_bytes: 25_000,
            max_memory_chars: 500,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub debug: bool,
    /// Daily log files to keep
    pub log_retention_count: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            debug: false,
            log_retention_count: 7,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub budget: BudgetConfig,
    pub hook: HookConfig,
    pub dream: DreamConfig,
    pub limits: MemoryLimits,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a JSON file. A missing file yields defaults;
    /// unknown or missing fields fall back per-field.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("invalid config at {:?}: {e}; using defaults", path);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// The default config file location (`<data-dir>/config.json`).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "grain", "reverie")
            .map(|dirs| dirs.data_dir().join("config.json"))
    }
}
