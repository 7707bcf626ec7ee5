//! Regular-expression recognizer
//!
//! Deterministic and local: every intent pattern that matches the utterance
//! scores 1.0. Named capture groups of matching intent patterns and matches
//! of entity patterns become entities.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::{Recognizer, RecognizerError, RecognizerResult};
use crate::turn_context::TurnContext;

#[derive(Debug, Default)]
pub struct RegexRecognizer {
    intents: Vec<(String, Regex)>,
    entities: Vec<(String, Regex)>,
}

impl RegexRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_intent(mut self, name: &str, pattern: &str) -> Result<Self, RecognizerError> {
        self.intents.push((name.to_string(), compile(name, pattern)?));
        Ok(self)
    }

    pub fn with_entity(mut self, name: &str, pattern: &str) -> Result<Self, RecognizerError> {
        self.entities.push((name.to_string(), compile(name, pattern)?));
        Ok(self)
    }

    /// Recognize a raw utterance
    pub fn recognize_text(&self, text: &str) -> RecognizerResult {
        let mut result = RecognizerResult::unrecognized(text);

        for (name, pattern) in &self.intents {
            let Some(captures) = pattern.captures(text) else {
                continue;
            };
            result.intents.insert(name.clone(), 1.0);
            for group in pattern.capture_names().flatten() {
                if let Some(m) = captures.name(group) {
                    result
                        .entities
                        .entry(group.to_string())
                        .or_insert_with(|| Value::String(m.as_str().to_string()));
                }
            }
        }

        for (name, pattern) in &self.entities {
            if let Some(captures) = pattern.captures(text) {
                // First capture group if the pattern has one, whole match otherwise
                let m = captures.get(1).or_else(|| captures.get(0));
                if let Some(m) = m {
                    result
                        .entities
                        .insert(name.clone(), Value::String(m.as_str().to_string()));
                }
            }
        }

        result
    }
}

fn compile(name: &str, pattern: &str) -> Result<Regex, RecognizerError> {
    Regex::new(pattern).map_err(|source| RecognizerError::InvalidPattern {
        name: name.to_string(),
        source,
    })
}

#[async_trait]
impl Recognizer for RegexRecognizer {
    async fn recognize(&self, turn: &TurnContext) -> Result<RecognizerResult, RecognizerError> {
        let text = turn.activity().text.as_deref().unwrap_or("");
        Ok(self.recognize_text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recognizer() -> RegexRecognizer {
        RegexRecognizer::new()
            .with_intent("greeting", r"(?i)\b(hi|hello)\b")
            .unwrap()
            .with_intent("order", r"(?i)\border (?P<item>\w+)")
            .unwrap()
            .with_entity("number", r"(\d+)")
            .unwrap()
    }

    #[test]
    fn test_all_matching_intents_score() {
        let result = recognizer().recognize_text("hello, order pizza");
        assert_eq!(result.intents.get("greeting"), Some(&1.0));
        assert_eq!(result.intents.get("order"), Some(&1.0));
        assert_eq!(result.entities["item"], Value::String("pizza".into()));
    }

    #[test]
    fn test_entity_patterns() {
        let result = recognizer().recognize_text("order 2 pizzas");
        assert_eq!(result.entities["number"], Value::String("2".into()));
        assert!(!result.intents.contains_key("greeting"));
    }

    #[test]
    fn test_no_match() {
        let result = recognizer().recognize_text("what is the weather");
        assert!(result.intents.is_empty());
        assert!(result.top_intent().is_none());
        assert_eq!(result.text, "what is the weather");
    }

    #[test]
    fn test_invalid_pattern() {
        let err = RegexRecognizer::new().with_intent("broken", "(").unwrap_err();
        assert!(matches!(err, RecognizerError::InvalidPattern { .. }));
    }
}
