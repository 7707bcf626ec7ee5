// Recognizers: map an utterance to intents and entities

pub mod regex_recognizer;

pub use regex_recognizer::RegexRecognizer;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::turn_context::TurnContext;

/// What a recognizer understood from the current activity
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognizerResult {
    pub text: String,
    /// Intent name -> score
    #[serde(default)]
    pub intents: BTreeMap<String, f64>,
    /// Entity name -> value
    #[serde(default)]
    pub entities: BTreeMap<String, Value>,
}

impl RecognizerResult {
    /// A result carrying only the text, for when no recognizer is configured
    pub fn unrecognized(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    /// Highest scoring intent
    pub fn top_intent(&self) -> Option<(&str, f64)> {
        self.intents
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, score)| (name.as_str(), *score))
    }
}

/// External service mapping free text to intents and entities
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, turn: &TurnContext) -> Result<RecognizerResult, RecognizerError>;
}

/// Errors from recognizers
#[derive(Debug, thiserror::Error)]
pub enum RecognizerError {
    #[error("Invalid pattern for '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },
    #[error("Recognition failed: {0}")]
    Failed(String),
}
