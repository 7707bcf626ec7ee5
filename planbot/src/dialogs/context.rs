// Dialog context: a dialog stack bound to a dialog set and the current turn

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use super::types::*;
use super::{Dialog, DialogMemory, DialogSet};
use crate::activity::Activity;
use crate::turn_context::TurnContext;

/// Runs the dialogs of one stack for the current turn.
///
/// The last element of the stack is the active dialog. A container dialog
/// runs its children on a [`DialogContext::child`] context built over the
/// child stack it persists, then stores the stack back from
/// [`DialogContext::into_stack`].
pub struct DialogContext {
    dialogs: Arc<DialogSet>,
    turn: Arc<TurnContext>,
    memory: Arc<Mutex<DialogMemory>>,
    stack: Vec<DialogInstance>,
    /// Unique id of the containing instance, empty at the root
    scope: String,
    /// Bubbling events nobody on this stack consumed
    pending_events: Vec<DialogEvent>,
}

impl DialogContext {
    pub fn new(
        dialogs: Arc<DialogSet>,
        turn: Arc<TurnContext>,
        memory: Arc<Mutex<DialogMemory>>,
        stack: Vec<DialogInstance>,
    ) -> Self {
        Self {
            dialogs,
            turn,
            memory,
            stack,
            scope: String::new(),
            pending_events: Vec::new(),
        }
    }

    /// Context for a nested stack owned by this context's active dialog
    pub fn child(&self, dialogs: Arc<DialogSet>, stack: Vec<DialogInstance>) -> DialogContext {
        DialogContext {
            dialogs,
            turn: self.turn.clone(),
            memory: self.memory.clone(),
            stack,
            scope: format!("{}/", self.unique_instance_id().unwrap_or_default()),
            pending_events: Vec::new(),
        }
    }

    pub fn turn(&self) -> &Arc<TurnContext> {
        &self.turn
    }

    pub fn activity(&self) -> &Activity {
        self.turn.activity()
    }

    pub fn dialogs(&self) -> &Arc<DialogSet> {
        &self.dialogs
    }

    /// Run `f` with exclusive access to dialog memory
    pub fn with_memory<R>(&self, f: impl FnOnce(&mut DialogMemory) -> R) -> R {
        let mut memory = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut memory)
    }

    pub fn stack(&self) -> &[DialogInstance] {
        &self.stack
    }

    pub fn into_stack(self) -> Vec<DialogInstance> {
        self.stack
    }

    pub fn active_dialog(&self) -> Option<&DialogInstance> {
        self.stack.last()
    }

    pub fn active_dialog_mut(&mut self) -> Option<&mut DialogInstance> {
        self.stack.last_mut()
    }

    /// Identity of the active instance, derived from stack depth and the
    /// active dialog id. A container compares it before and after handing
    /// the turn to a child to detect that it was removed meanwhile.
    pub fn unique_instance_id(&self) -> Option<String> {
        self.active_dialog()
            .map(|active| format!("{}{}:{}", self.scope, self.stack.len(), active.id))
    }

    pub fn find_dialog(&self, dialog_id: &str) -> Option<Arc<dyn Dialog>> {
        self.dialogs.find(dialog_id)
    }

    fn active_handle(&self) -> DialogResult<Option<Arc<dyn Dialog>>> {
        match self.active_dialog() {
            None => Ok(None),
            Some(instance) => self
                .find_dialog(&instance.id)
                .map(Some)
                .ok_or_else(|| DialogError::DialogNotFound(instance.id.clone())),
        }
    }

    /// Push a dialog and begin it
    pub async fn begin_dialog(
        &mut self,
        dialog_id: &str,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let dialog = self
            .find_dialog(dialog_id)
            .ok_or_else(|| DialogError::DialogNotFound(dialog_id.to_string()))?;
        log::debug!("begin dialog '{}' at depth {}", dialog_id, self.stack.len() + 1);
        self.stack.push(DialogInstance::new(dialog_id));
        dialog.begin_dialog(self, options).await
    }

    /// Consult the active dialog, if any
    pub async fn consult_dialog(&mut self) -> DialogResult<Option<DialogConsultation>> {
        match self.active_handle()? {
            Some(dialog) => Ok(Some(dialog.consult_dialog(self).await?)),
            None => Ok(None),
        }
    }

    /// Consult the active dialog and run its processor right away
    pub async fn continue_dialog(&mut self) -> DialogResult<DialogTurnResult> {
        match self.consult_dialog().await? {
            Some(consultation) => consultation.process(self).await,
            None => Ok(DialogTurnResult::empty()),
        }
    }

    /// Call `continue_dialog` on the active dialog without consulting it
    pub async fn continue_active_dialog(&mut self) -> DialogResult<DialogTurnResult> {
        match self.active_handle()? {
            Some(dialog) => dialog.continue_dialog(self).await,
            None => Ok(DialogTurnResult::empty()),
        }
    }

    /// Pop the active dialog and resume the one below it with `result`
    pub async fn end_dialog(&mut self, result: Option<Value>) -> DialogResult<DialogTurnResult> {
        self.end_active(DialogReason::EndCalled).await?;
        match self.active_handle()? {
            Some(parent) => {
                parent
                    .resume_dialog(self, DialogReason::EndCalled, result)
                    .await
            }
            None => Ok(DialogTurnResult::complete(result)),
        }
    }

    async fn end_active(&mut self, reason: DialogReason) -> DialogResult<()> {
        if let Some(instance) = self.stack.pop() {
            log::debug!("end dialog '{}' ({:?})", instance.id, reason);
            if let Some(dialog) = self.find_dialog(&instance.id) {
                dialog.end_dialog(self, instance, reason).await?;
            }
        }
        Ok(())
    }

    /// Cancel the whole dialog tree.
    ///
    /// Ends every instance on this stack and records the cancellation on the
    /// turn so containing contexts unwind their stacks as well.
    pub async fn cancel_all_dialogs(
        &mut self,
        reason: CancellationReason,
        details: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        let cancellation = Cancellation { reason, details };
        log::info!("cancelling all dialogs ({:?})", reason);
        self.turn.request_cancellation(cancellation.clone());
        self.cancel_stack().await?;
        Ok(DialogTurnResult::cancelled(&cancellation))
    }

    /// End every instance on this stack without touching the turn
    pub async fn cancel_stack(&mut self) -> DialogResult<()> {
        while !self.stack.is_empty() {
            self.end_active(DialogReason::CancelCalled).await?;
        }
        Ok(())
    }

    /// Unwind this stack if a nested context cancelled the tree.
    /// Returns true when something was cancelled.
    pub async fn propagate_cancellation(&mut self) -> DialogResult<bool> {
        if self.stack.is_empty() || self.turn.cancellation().is_none() {
            return Ok(false);
        }
        self.cancel_stack().await?;
        Ok(true)
    }

    /// Ask the active dialog to re-send its prompt
    pub async fn reprompt_dialog(&mut self) -> DialogResult<()> {
        if let Some(dialog) = self.active_handle()? {
            dialog.reprompt_dialog(self).await?;
        }
        Ok(())
    }

    /// Deliver an event to the active dialog. Unhandled bubbling events are
    /// parked for the containing dialog, see [`Self::take_pending_events`].
    pub async fn emit_event(&mut self, event: DialogEvent) -> DialogResult<bool> {
        if let Some(dialog) = self.active_handle()? {
            if dialog.on_dialog_event(self, &event).await? {
                return Ok(true);
            }
        }
        if event.bubble {
            self.pending_events.push(event);
        }
        Ok(false)
    }

    pub fn take_pending_events(&mut self) -> Vec<DialogEvent> {
        std::mem::take(&mut self.pending_events)
    }
}
