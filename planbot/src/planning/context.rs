// Planning context: plan access and change queuing over a dialog context

use serde_json::Value;

use super::change::{PlanChangeList, PlanChangeType};
use super::plan::{Plan, PlanStatus, PlanStep, PlanningState};
use crate::activity::Activity;
use crate::dialogs::{
    CancellationReason, DialogContext, DialogError, DialogInstance, DialogResult,
    DialogTurnResult,
};
use crate::turn_context::TurnContext;

/// View over a dialog context whose active dialog is a planning dialog.
///
/// Change lists queued during evaluation are buffered in turn state under
/// the instance's unique id and only touch the plan in [`apply_changes`],
/// so every rule of one evaluation sees the same plan.
///
/// [`apply_changes`]: PlanningContext::apply_changes
pub struct PlanningContext<'a> {
    dc: &'a mut DialogContext,
    key: String,
    state: PlanningState,
    max_history: usize,
    /// Nested stacks of running steps dropped by applied changes
    abandoned: Vec<Vec<DialogInstance>>,
}

impl<'a> PlanningContext<'a> {
    /// Load the planning state of the active dialog of `dc`
    pub fn load(dc: &'a mut DialogContext, max_history: usize) -> DialogResult<Self> {
        let instance = dc.active_dialog().ok_or(DialogError::NoActiveDialog)?;
        let state = PlanningState::from_instance(instance)?;
        let key = dc.unique_instance_id().ok_or(DialogError::NoActiveDialog)?;
        Ok(Self {
            dc,
            key,
            state,
            max_history,
            abandoned: Vec::new(),
        })
    }

    /// Write the state back to the instance it was loaded from. Does nothing
    /// when that instance is no longer active.
    pub fn save(&mut self) -> DialogResult<()> {
        if self.dc.unique_instance_id().as_deref() != Some(self.key.as_str()) {
            log::debug!("planning instance {} is gone, state not saved", self.key);
            return Ok(());
        }
        let value = self.state.to_value()?;
        if let Some(instance) = self.dc.active_dialog_mut() {
            instance.state = value;
        }
        Ok(())
    }

    pub fn dc(&mut self) -> &mut DialogContext {
        &mut *self.dc
    }

    pub fn turn(&self) -> &TurnContext {
        self.dc.turn()
    }

    pub fn activity(&self) -> &Activity {
        self.dc.activity()
    }

    pub fn state(&self) -> &PlanningState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PlanningState {
        &mut self.state
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.state.plan.as_ref()
    }

    pub fn plan_mut(&mut self) -> Option<&mut Plan> {
        self.state.plan.as_mut()
    }

    pub fn current_step(&self) -> Option<&PlanStep> {
        self.plan().and_then(Plan::current_step)
    }

    /// Any active or archived plan
    pub fn has_plans(&self) -> bool {
        self.state.plan.is_some() || !self.state.history.is_empty()
    }

    fn changes_key(&self) -> String {
        format!("planning.changes:{}", self.key)
    }

    pub fn queue_changes(&self, change: PlanChangeList) {
        log::debug!(
            "queue {:?} with {} step(s) for {}",
            change.change_type,
            change.steps.len(),
            self.key
        );
        self.turn()
            .update_turn_state::<Vec<PlanChangeList>, _>(&self.changes_key(), |queue| {
                queue.push(change)
            });
    }

    pub fn has_pending_changes(&self) -> bool {
        self.turn()
            .update_turn_state::<Vec<PlanChangeList>, _>(&self.changes_key(), |queue| {
                !queue.is_empty()
            })
    }

    /// Apply queued change lists in order. Returns false, leaving the plan
    /// untouched, when nothing was queued.
    pub fn apply_changes(&mut self) -> bool {
        let changes = self
            .turn()
            .take_turn_state::<Vec<PlanChangeList>>(&self.changes_key())
            .unwrap_or_default();
        if changes.is_empty() {
            return false;
        }
        for change in changes {
            self.apply_change(change);
        }
        true
    }

    /// Nested stacks of running steps that applied changes discarded. The
    /// caller must end these instances.
    pub fn take_abandoned(&mut self) -> Vec<Vec<DialogInstance>> {
        std::mem::take(&mut self.abandoned)
    }

    fn abandon_running_steps(&mut self) {
        let Some(plan) = self.state.plan.as_mut() else {
            return;
        };
        for step in plan.steps.iter_mut().filter(|step| step.is_in_progress()) {
            log::debug!("step '{}' discarded while running", step.dialog_id);
            self.abandoned.push(std::mem::take(&mut step.dialog_stack));
        }
    }

    fn apply_change(&mut self, change: PlanChangeList) {
        if change.change_type.starts_plan() || change.change_type == PlanChangeType::EndPlan {
            self.abandon_running_steps();
        }
        let max_history = self.max_history;
        let state = &mut self.state;
        match change.change_type {
            PlanChangeType::NewPlan => {
                state.archive_plan(PlanStatus::Cancelled, max_history);
                state.plan = Some(Plan::new(change.steps));
            }
            PlanChangeType::ReplacePlan => match state.plan.as_mut() {
                Some(plan) => plan.steps = change.steps,
                None => state.plan = Some(Plan::new(change.steps)),
            },
            PlanChangeType::EndPlan => {
                state.archive_plan(PlanStatus::Cancelled, max_history);
                if !change.steps.is_empty() {
                    state.plan = Some(Plan::new(change.steps));
                }
            }
            PlanChangeType::DoSteps => {
                let plan = state.plan.get_or_insert_with(Plan::default);
                plan.steps.splice(0..0, change.steps);
            }
            PlanChangeType::DoStepsLater => {
                let plan = state.plan.get_or_insert_with(Plan::default);
                plan.steps.extend(change.steps);
            }
            PlanChangeType::DoStepsBeforeTags => {
                let plan = state.plan.get_or_insert_with(Plan::default);
                let position = plan
                    .steps
                    .iter()
                    .position(|step| step.tags.iter().any(|tag| change.tags.contains(tag)))
                    .unwrap_or(plan.steps.len());
                plan.steps.splice(position..position, change.steps);
            }
        }
        if let Some(plan) = &state.plan {
            log::debug!("plan for {} now has {} step(s)", self.key, plan.steps.len());
        }
    }

    /// Pop the finished head step; archive the plan once it is empty
    pub fn end_step(&mut self) -> Option<PlanStep> {
        let plan = self.state.plan.as_mut()?;
        let finished = if plan.steps.is_empty() {
            None
        } else {
            Some(plan.steps.remove(0))
        };
        if plan.steps.is_empty() {
            log::info!("plan for {} completed", self.key);
            self.state
                .archive_plan(PlanStatus::Completed, self.max_history);
        }
        finished
    }

    /// End this planning dialog, returning `result` to its parent
    pub async fn end_dialog(mut self, result: Option<Value>) -> DialogResult<DialogTurnResult> {
        self.save()?;
        self.dc.end_dialog(result).await
    }

    /// Cancel the whole dialog tree with a reason and payload
    pub async fn cancel_all_dialogs(
        mut self,
        reason: CancellationReason,
        details: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        self.save()?;
        self.dc.cancel_all_dialogs(reason, details).await
    }
}
