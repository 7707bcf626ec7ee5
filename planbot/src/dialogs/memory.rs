//! Dialog memory
//!
//! Property bags that steps read and write through dotted paths such as
//! `user.name` or `conversation.order.id`. The bags are backed by the
//! persisted user and conversation documents, so anything written here is
//! saved with the turn's state.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use super::{DialogError, DialogResult};

static TEMPLATE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\s*((?:user|conversation)(?:\.[A-Za-z0-9_\-]+)+)\s*\}").unwrap()
});

/// Memory scopes visible to dialogs
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DialogMemory {
    user: Map<String, Value>,
    conversation: Map<String, Value>,
}

impl DialogMemory {
    pub fn new(user: Map<String, Value>, conversation: Map<String, Value>) -> Self {
        Self { user, conversation }
    }

    pub fn user(&self) -> &Map<String, Value> {
        &self.user
    }

    pub fn conversation(&self) -> &Map<String, Value> {
        &self.conversation
    }

    pub fn into_parts(self) -> (Map<String, Value>, Map<String, Value>) {
        (self.user, self.conversation)
    }

    /// Look up a dotted path
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let scope = match segments.next()? {
            "user" => &self.user,
            "conversation" => &self.conversation,
            _ => return None,
        };
        let mut current = scope.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Write a dotted path, creating intermediate objects
    pub fn set(&mut self, path: &str, value: Value) -> DialogResult<()> {
        let invalid = |reason: &str| DialogError::InvalidMemoryPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let mut segments: Vec<&str> = path.split('.').collect();
        if segments.len() < 2 {
            return Err(invalid("expected <scope>.<property>"));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(invalid("empty path segment"));
        }
        // Reserved for the persisted envelope
        if segments[1].starts_with('_') || segments[1] == "eTag" {
            return Err(invalid("reserved property name"));
        }

        let mut current = match segments.remove(0) {
            "user" => &mut self.user,
            "conversation" => &mut self.conversation,
            _ => return Err(invalid("unknown scope")),
        };
        let last = segments.pop().ok_or_else(|| invalid("missing property"))?;
        for segment in segments {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = match entry {
                Value::Object(map) => map,
                _ => return Err(invalid("not an object")),
            };
        }
        current.insert(last.to_string(), value);
        Ok(())
    }

    /// Substitute `{user.x}` / `{conversation.y}` references. Missing
    /// properties render as empty strings.
    pub fn format(&self, template: &str) -> String {
        TEMPLATE_REF
            .replace_all(template, |caps: &Captures| match self.get(&caps[1]) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            })
            .into_owned()
    }
}
