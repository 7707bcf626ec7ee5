// Core types for the dialog runtime

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::DialogContext;
use crate::recognizer::RecognizerError;

/// Result type for dialog operations
pub type DialogResult<T> = Result<T, DialogError>;

/// One entry of a dialog stack
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DialogInstance {
    /// Id of the dialog that owns this instance
    pub id: String,
    /// Dialog-owned persisted state
    #[serde(default)]
    pub state: Value,
}

impl DialogInstance {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Value::Null,
        }
    }
}

/// Outcome of running a dialog for one turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DialogTurnStatus {
    /// Nothing was active, nothing ran
    Empty,
    /// The active dialog is waiting for the next turn
    Waiting,
    /// The dialog stack completed
    Complete,
    /// The dialog stack was cancelled
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DialogTurnResult {
    pub status: DialogTurnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl DialogTurnResult {
    pub fn empty() -> Self {
        Self {
            status: DialogTurnStatus::Empty,
            result: None,
        }
    }

    pub fn waiting() -> Self {
        Self {
            status: DialogTurnStatus::Waiting,
            result: None,
        }
    }

    pub fn complete(result: Option<Value>) -> Self {
        Self {
            status: DialogTurnStatus::Complete,
            result,
        }
    }

    pub fn cancelled(cancellation: &Cancellation) -> Self {
        Self {
            status: DialogTurnStatus::Cancelled,
            result: serde_json::to_value(cancellation).ok(),
        }
    }
}

/// Why a dialog is being resumed or ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialogReason {
    BeginCalled,
    ContinueCalled,
    EndCalled,
    CancelCalled,
}

/// Why the dialog tree was cancelled
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CancellationReason {
    /// A dialog failed and the tree unwound
    Error,
    /// A dialog asked for the tree to be cancelled
    Cancelled,
}

/// Payload carried by a cancel-all transition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: CancellationReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// A named event raised while dialogs run
#[derive(Clone, Debug, PartialEq)]
pub struct DialogEvent {
    pub name: String,
    pub value: Option<Value>,
    /// Whether unhandled events travel up to containing dialogs
    pub bubble: bool,
}

impl DialogEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            bubble: false,
        }
    }

    pub fn with_value(mut self, value: Option<Value>) -> Self {
        self.value = value;
        self
    }

    pub fn bubbling(mut self) -> Self {
        self.bubble = true;
        self
    }
}

/// How strongly a consulted dialog wants the turn
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsultationDesire {
    /// The dialog can handle the turn but yields to interruptions
    CanProcess,
    /// The dialog insists on handling the turn
    ShouldProcess,
}

/// One-shot async function run against a dialog context
pub type ConsultationProcessor = Box<
    dyn for<'a> FnOnce(&'a mut DialogContext) -> BoxFuture<'a, DialogResult<DialogTurnResult>>
        + Send,
>;

/// Answer to a consultation: the desire plus the deferred work to do the turn
pub struct DialogConsultation {
    pub desire: ConsultationDesire,
    processor: ConsultationProcessor,
}

impl DialogConsultation {
    pub fn new<F>(desire: ConsultationDesire, processor: F) -> Self
    where
        F: for<'a> FnOnce(&'a mut DialogContext) -> BoxFuture<'a, DialogResult<DialogTurnResult>>
            + Send
            + 'static,
    {
        Self {
            desire,
            processor: Box::new(processor),
        }
    }

    /// A consultation whose processor returns an already computed result
    pub fn ready(desire: ConsultationDesire, result: DialogTurnResult) -> Self {
        Self::new(desire, move |_dc| Box::pin(async move { Ok(result) }))
    }

    /// Run the processor
    pub async fn process(self, dc: &mut DialogContext) -> DialogResult<DialogTurnResult> {
        (self.processor)(dc).await
    }
}

impl std::fmt::Debug for DialogConsultation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogConsultation")
            .field("desire", &self.desire)
            .finish_non_exhaustive()
    }
}

/// Errors raised by dialogs and the planning core
#[derive(Debug, thiserror::Error)]
pub enum DialogError {
    #[error("Dialog not found: {0}")]
    DialogNotFound(String),

    #[error("Duplicate dialog id: {0}")]
    DuplicateDialog(String),

    #[error("No active dialog on the stack")]
    NoActiveDialog,

    #[error("Invalid memory path '{path}': {reason}")]
    InvalidMemoryPath { path: String, reason: String },

    #[error("Dialog state error: {0}")]
    State(#[from] serde_json::Error),

    #[error("Recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),

    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },
}
