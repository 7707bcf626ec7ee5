// Dialogs: the nested dialog stack the planning core runs on
//
// A dialog context owns a stack of dialog instances. Containers run their
// children on child contexts created by value over a nested stack and take
// the stack back when the call returns, so no context ever aliases another.

pub mod context;
pub mod dialog_set;
pub mod memory;
pub mod steps;
pub mod types;


pub use context::DialogContext;
pub use dialog_set::DialogSet;
pub use memory::DialogMemory;
pub use steps::{CancelAllDialogs, EmitEvent, SendActivity, SetProperty, TextInput};
pub use types::*;

use async_trait::async_trait;
use serde_json::Value;

/// A unit of conversational work that can span turns
#[async_trait]
pub trait Dialog: Send + Sync {
    /// Unique id within the dialog set it is registered in
    fn id(&self) -> &str;

    /// Called when the dialog is pushed onto the stack. The new instance is
    /// already the active dialog of `dc`.
    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult>;

    /// Ask the dialog how it wants to process the current turn.
    async fn consult_dialog(&self, _dc: &mut DialogContext) -> DialogResult<DialogConsultation> {
        Ok(DialogConsultation::new(
            ConsultationDesire::CanProcess,
            |dc| Box::pin(async move { dc.continue_active_dialog().await }),
        ))
    }

    /// Handle a new turn while this dialog is active
    async fn continue_dialog(&self, _dc: &mut DialogContext) -> DialogResult<DialogTurnResult> {
        Ok(DialogTurnResult::waiting())
    }

    /// A dialog pushed above this one completed
    async fn resume_dialog(
        &self,
        dc: &mut DialogContext,
        _reason: DialogReason,
        result: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        dc.end_dialog(result).await
    }

    /// Re-send whatever the dialog is waiting on
    async fn reprompt_dialog(&self, _dc: &mut DialogContext) -> DialogResult<()> {
        Ok(())
    }

    /// Called after the instance was popped from the stack of `dc`
    async fn end_dialog(
        &self,
        _dc: &mut DialogContext,
        _instance: DialogInstance,
        _reason: DialogReason,
    ) -> DialogResult<()> {
        Ok(())
    }

    /// Returns true when the event was consumed
    async fn on_dialog_event(
        &self,
        _dc: &mut DialogContext,
        _event: &DialogEvent,
    ) -> DialogResult<bool> {
        Ok(false)
    }
}
