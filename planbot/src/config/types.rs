use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Conversation expiry window in milliseconds; unset disables expiry
    pub expire_after_ms: Option<u64>,
    /// Archived plans kept per planning dialog instance
    pub max_plan_history: usize,
    /// State storage backend
    pub storage: StorageConfig,
    /// Patterns for the regular-expression recognizer
    pub recognizer: RecognizerConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            expire_after_ms: None,
            max_plan_history: crate::planning::dialog::DEFAULT_MAX_PLAN_HISTORY,
            storage: StorageConfig::default(),
            recognizer: RecognizerConfig::default(),
        }
    }
}

/// Storage backends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Process-local, lost on exit
    #[default]
    Memory,
    /// One JSON file per key under `path`
    File { path: PathBuf },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub intents: Vec<PatternConfig>,
    pub entities: Vec<PatternConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    pub name: String,
    pub pattern: String,
}
