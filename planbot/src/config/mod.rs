//! Bot configuration
//!
//! Loaded from TOML; every field has a default so an empty file is a valid
//! configuration (in-memory storage, no expiry, no recognizer patterns).

pub mod types;

pub use types::*;

use std::path::Path;
use std::sync::Arc;

use crate::recognizer::{RecognizerError, RegexRecognizer};
use crate::storage::{FileStorage, MemoryStorage, Storage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid setting '{field}': {reason}")]
    Invalid { field: String, reason: String },

    #[error(transparent)]
    Recognizer(#[from] RecognizerError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl BotConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: BotConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.expire_after_ms == Some(0) {
            return Err(ConfigError::Invalid {
                field: "expire_after_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if let StorageConfig::File { path } = &self.storage {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "storage.path".into(),
                    reason: "must not be empty".into(),
                });
            }
        }
        Ok(())
    }

    /// Expiry window, if any
    pub fn expire_after(&self) -> Option<chrono::Duration> {
        self.expire_after_ms
            .and_then(|ms| i64::try_from(ms).ok())
            .map(chrono::Duration::milliseconds)
    }

    pub fn build_storage(&self) -> Result<Arc<dyn Storage>, ConfigError> {
        Ok(match &self.storage {
            StorageConfig::Memory => Arc::new(MemoryStorage::new()),
            StorageConfig::File { path } => Arc::new(FileStorage::new(path)?),
        })
    }

    pub fn build_recognizer(&self) -> Result<RegexRecognizer, ConfigError> {
        let mut recognizer = RegexRecognizer::new();
        for intent in &self.recognizer.intents {
            recognizer = recognizer.with_intent(&intent.name, &intent.pattern)?;
        }
        for entity in &self.recognizer.entities {
            recognizer = recognizer.with_entity(&entity.name, &entity.pattern)?;
        }
        Ok(recognizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_defaults() {
        let config = BotConfig::from_toml_str("").unwrap();
        assert_eq!(config.expire_after_ms, None);
        assert!(config.expire_after().is_none());
        assert_eq!(config.max_plan_history, 10);
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert!(config.recognizer.intents.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = BotConfig::from_toml_str(
            r#"
            expire_after_ms = 600000
            max_plan_history = 3

            [storage]
            kind = "file"
            path = "/tmp/planbot"

            [[recognizer.intents]]
            name = "greeting"
            pattern = "(?i)\\bhello\\b"

            [[recognizer.entities]]
            name = "number"
            pattern = "(\\d+)"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.expire_after(),
            Some(chrono::Duration::milliseconds(600_000))
        );
        assert_eq!(config.max_plan_history, 3);
        match &config.storage {
            StorageConfig::File { path } => assert_eq!(path.to_str(), Some("/tmp/planbot")),
            other => panic!("unexpected storage {:?}", other),
        }

        let recognized = config.build_recognizer().unwrap().recognize_text("hello 42");
        assert!(recognized.intents.contains_key("greeting"));
        assert_eq!(recognized.entities["number"], serde_json::json!("42"));
    }

    #[test]
    fn test_invalid_settings() {
        assert!(matches!(
            BotConfig::from_toml_str("expire_after_ms = 0"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            BotConfig::from_toml_str("max_plan_history = \"many\""),
            Err(ConfigError::Parse(_))
        ));

        let config = BotConfig::from_toml_str(
            r#"
            [[recognizer.intents]]
            name = "broken"
            pattern = "("
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.build_recognizer(),
            Err(ConfigError::Recognizer(_))
        ));
    }
}
