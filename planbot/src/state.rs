//! Persisted bot state
//!
//! ```json
//! {
//!   "userState": { "eTag": "...", "name": "Alice" },
//!   "conversationState": {
//!     "eTag": "...",
//!     "_dialogs": { "dialogStack": [ ... ] },
//!     "_lastAccess": "2024-05-01T10:00:00Z"
//!   }
//! }
//! ```
//!
//! Properties other than the reserved ones are the dialog memory scopes
//! (`user.*` and `conversation.*`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dialogs::DialogInstance;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBotState {
    #[serde(default)]
    pub user_state: UserState,
    #[serde(default)]
    pub conversation_state: ConversationState,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    #[serde(rename = "eTag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(rename = "eTag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(rename = "_dialogs", default, skip_serializing_if = "Option::is_none")]
    pub dialogs: Option<DialogState>,
    #[serde(rename = "_lastAccess", default, skip_serializing_if = "Option::is_none")]
    pub last_access: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

/// Persisted root dialog stack
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogState {
    #[serde(default)]
    pub dialog_stack: Vec<DialogInstance>,
}

impl ConversationState {
    /// Drop everything but the concurrency token
    pub fn reset(&mut self) {
        *self = ConversationState {
            etag: self.etag.take(),
            ..Default::default()
        };
    }

    /// True when the last access is at least `window` old
    pub fn is_expired(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        match self.last_access {
            Some(last_access) => now - last_access >= window,
            None => false,
        }
    }
}

impl StoredBotState {
    pub fn from_documents(user: Option<Value>, conversation: Option<Value>) -> serde_json::Result<Self> {
        Ok(Self {
            user_state: match user {
                Some(doc) => serde_json::from_value(doc)?,
                None => UserState::default(),
            },
            conversation_state: match conversation {
                Some(doc) => serde_json::from_value(doc)?,
                None => ConversationState::default(),
            },
        })
    }
}
