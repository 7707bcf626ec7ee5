// Built-in step dialogs used by plans

use async_trait::async_trait;
use serde_json::Value;

use super::types::*;
use super::{Dialog, DialogContext};

/// Sends a templated text message and completes
pub struct SendActivity {
    id: String,
    text: String,
}

impl SendActivity {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

#[async_trait]
impl Dialog for SendActivity {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        _options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let text = dc.with_memory(|memory| memory.format(&self.text));
        dc.turn().send_text(&text);
        dc.end_dialog(None).await
    }
}

/// Prompts for free text and waits for the reply
pub struct TextInput {
    id: String,
    prompt: String,
    /// Memory path the reply is written to
    property: Option<String>,
}

impl TextInput {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            property: None,
        }
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    fn send_prompt(&self, dc: &DialogContext) {
        let text = dc.with_memory(|memory| memory.format(&self.prompt));
        dc.turn().send_text(&text);
    }
}

#[async_trait]
impl Dialog for TextInput {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        _options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        self.send_prompt(dc);
        Ok(DialogTurnResult::waiting())
    }

    async fn continue_dialog(&self, dc: &mut DialogContext) -> DialogResult<DialogTurnResult> {
        let Some(text) = dc.activity().message_text().map(|t| t.trim().to_string()) else {
            return Ok(DialogTurnResult::waiting());
        };
        if text.is_empty() {
            self.send_prompt(dc);
            return Ok(DialogTurnResult::waiting());
        }
        if let Some(property) = &self.property {
            dc.with_memory(|memory| memory.set(property, Value::String(text.clone())))?;
        }
        dc.end_dialog(Some(Value::String(text))).await
    }

    async fn reprompt_dialog(&self, dc: &mut DialogContext) -> DialogResult<()> {
        self.send_prompt(dc);
        Ok(())
    }
}

/// Writes a value into dialog memory and completes
pub struct SetProperty {
    id: String,
    property: String,
    value: Value,
}

impl SetProperty {
    pub fn new(id: impl Into<String>, property: impl Into<String>, value: Value) -> Self {
        Self {
            id: id.into(),
            property: property.into(),
            value,
        }
    }
}

#[async_trait]
impl Dialog for SetProperty {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        _options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        dc.with_memory(|memory| memory.set(&self.property, self.value.clone()))?;
        dc.end_dialog(None).await
    }
}

/// Raises a named event and completes with whether it was handled
pub struct EmitEvent {
    id: String,
    event_name: String,
    value: Option<Value>,
    bubble: bool,
}

impl EmitEvent {
    pub fn new(id: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            event_name: event_name.into(),
            value: None,
            bubble: true,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn local(mut self) -> Self {
        self.bubble = false;
        self
    }
}

#[async_trait]
impl Dialog for EmitEvent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        _options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let mut event = DialogEvent::new(&self.event_name).with_value(self.value.clone());
        event.bubble = self.bubble;
        let handled = dc.emit_event(event).await?;
        dc.end_dialog(Some(Value::Bool(handled))).await
    }
}

/// Cancels the entire dialog tree
pub struct CancelAllDialogs {
    id: String,
    details: Option<Value>,
}

impl CancelAllDialogs {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[async_trait]
impl Dialog for CancelAllDialogs {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        _options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        dc.cancel_all_dialogs(CancellationReason::Cancelled, self.details.clone())
            .await
    }
}
