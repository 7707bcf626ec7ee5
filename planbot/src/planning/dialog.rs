// Planning dialog: evaluates rules into a plan and runs the plan's steps

use std::error::Error as _;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Value};

use super::context::PlanningContext;
use super::evaluator::RuleEvaluator;
use super::events;
use super::plan::{PlanStep, PlanningState};
use super::rules::Rule;
use crate::dialogs::{
    CancellationReason, ConsultationDesire, Dialog, DialogConsultation, DialogContext,
    DialogError, DialogEvent, DialogInstance, DialogReason, DialogResult, DialogSet,
    DialogTurnResult, DialogTurnStatus,
};
use crate::recognizer::Recognizer;

pub const DEFAULT_MAX_PLAN_HISTORY: usize = 10;

/// Installation state of the rules' step dialogs
enum Dependencies {
    Pending,
    Installed(Arc<DialogSet>),
}

/// A dialog whose behaviour is a set of rules.
///
/// Rules turn events into change lists, the change lists shape a plan and
/// the plan's steps run one at a time on a nested dialog stack persisted in
/// the step itself. The dialog ends with its result value once the plan is
/// exhausted.
///
/// Clones share the installed step dialogs.
#[derive(Clone)]
pub struct PlanningDialog {
    id: String,
    rules: Vec<Arc<dyn Rule>>,
    recognizer: Option<Arc<dyn Recognizer>>,
    dialogs: Vec<Arc<dyn Dialog>>,
    dependencies: Arc<Mutex<Dependencies>>,
    max_plan_history: usize,
}

impl PlanningDialog {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rules: Vec::new(),
            recognizer: None,
            dialogs: Vec::new(),
            dependencies: Arc::new(Mutex::new(Dependencies::Pending)),
            max_plan_history: DEFAULT_MAX_PLAN_HISTORY,
        }
    }

    pub fn with_rule<R: Rule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn with_recognizer<R: Recognizer + 'static>(mut self, recognizer: R) -> Self {
        self.recognizer = Some(Arc::new(recognizer));
        self
    }

    /// Register a dialog that steps may begin without being a rule's step
    pub fn with_dialog(mut self, dialog: Arc<dyn Dialog>) -> Self {
        self.dialogs.push(dialog);
        self
    }

    pub fn with_max_plan_history(mut self, max_plan_history: usize) -> Self {
        self.max_plan_history = max_plan_history;
        self
    }

    fn evaluator(&self) -> RuleEvaluator {
        RuleEvaluator::new(self.rules.clone(), self.recognizer.clone())
    }

    /// Step dialogs of every rule, registered once per dialog object
    fn install_dependencies(&self) -> DialogResult<Arc<DialogSet>> {
        let mut dependencies = self
            .dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Dependencies::Installed(set) = &*dependencies {
            return Ok(set.clone());
        }

        let mut set = DialogSet::new();
        for rule in &self.rules {
            for step in rule.steps() {
                set.add_shared(step)?;
            }
        }
        for dialog in &self.dialogs {
            set.add_shared(dialog.clone())?;
        }
        log::debug!("'{}' installed {} step dialog(s)", self.id, set.len());

        let set = Arc::new(set);
        *dependencies = Dependencies::Installed(set.clone());
        Ok(set)
    }

    async fn begin_plan(
        &self,
        dc: &mut DialogContext,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        self.install_dependencies()?;
        {
            let mut planning = PlanningContext::load(dc, self.max_plan_history)?;
            let state = planning.state_mut();
            state.result = options.as_ref().and_then(|o| o.get("value")).cloned();
            state.options = options.clone();

            let event = DialogEvent::new(events::BEGIN_DIALOG).with_value(options);
            self.evaluator().evaluate(&planning, event).await?;
            planning.save()?;
        }
        self.continue_plan(dc).await
    }

    async fn consult(&self, dc: &mut DialogContext) -> DialogResult<DialogConsultation> {
        self.install_dependencies()?;
        {
            let mut planning = PlanningContext::load(dc, self.max_plan_history)?;
            let activity = serde_json::to_value(planning.activity())?;
            let event = DialogEvent::new(events::CONSULT_DIALOG).with_value(Some(activity));
            self.evaluator().evaluate(&planning, event).await?;
            planning.save()?;
        }
        self.consult_plan(dc).await
    }

    /// Consult the plan and run the consultation right away
    fn continue_plan<'a>(
        &'a self,
        dc: &'a mut DialogContext,
    ) -> BoxFuture<'a, DialogResult<DialogTurnResult>> {
        Box::pin(async move {
            let consultation = self.consult_plan(dc).await?;
            consultation.process(dc).await
        })
    }

    /// Apply queued changes and ask the current step how it wants the turn
    async fn consult_plan(&self, dc: &mut DialogContext) -> DialogResult<DialogConsultation> {
        let dialogs = self.install_dependencies()?;
        let (step, abandoned) = {
            let mut planning = PlanningContext::load(dc, self.max_plan_history)?;
            if planning.apply_changes() {
                planning.save()?;
            }
            (planning.current_step().cloned(), planning.take_abandoned())
        };
        self.end_abandoned(dc, &dialogs, abandoned).await?;

        let this = self.clone();
        let Some(step) = step else {
            return Ok(DialogConsultation::new(
                ConsultationDesire::CanProcess,
                move |dc| this.finish_plan(dc),
            ));
        };

        let mut child = dc.child(dialogs, step.dialog_stack);
        let consultation = child.consult_dialog().await?;
        self.store_step_stack(dc, child.into_stack())?;

        let desire = consultation
            .as_ref()
            .map_or(ConsultationDesire::CanProcess, |c| c.desire);
        Ok(DialogConsultation::new(desire, move |dc| {
            this.run_step(dc, consultation)
        }))
    }

    fn run_step<'a>(
        self,
        dc: &'a mut DialogContext,
        consultation: Option<DialogConsultation>,
    ) -> BoxFuture<'a, DialogResult<DialogTurnResult>> {
        Box::pin(async move {
            match self.execute_step(dc, consultation).await {
                Ok(result) => Ok(result),
                Err(err) => self.fail(dc, err).await,
            }
        })
    }

    /// Run the current step for this turn and advance the plan once the
    /// step is done
    async fn execute_step(
        &self,
        dc: &mut DialogContext,
        consultation: Option<DialogConsultation>,
    ) -> DialogResult<DialogTurnResult> {
        let key = dc.unique_instance_id();
        let dialogs = self.install_dependencies()?;
        let step = PlanningContext::load(dc, self.max_plan_history)?
            .current_step()
            .cloned();
        let Some(step) = step else {
            return self.continue_plan(dc).await;
        };

        let mut child = dc.child(dialogs.clone(), step.dialog_stack.clone());
        let result = match drive_step(&mut child, consultation, &step).await {
            Ok(result) => result,
            Err(err) => {
                if let Err(cancel_err) = child.cancel_stack().await {
                    log::warn!("failed to unwind step '{}': {}", step.dialog_id, cancel_err);
                }
                // The instances are ended; the cancel hook must not see them again
                if let Err(store_err) = self.store_step_stack(dc, child.into_stack()) {
                    log::warn!("failed to store step '{}': {}", step.dialog_id, store_err);
                }
                return Err(err);
            }
        };
        let bubbled = child.take_pending_events();
        self.store_step_stack(dc, child.into_stack())?;

        // A nested cancel-all removes this container as well
        if dc.propagate_cancellation().await? || dc.unique_instance_id() != key {
            log::debug!("'{}' left the stack while running '{}'", self.id, step.dialog_id);
            return Ok(result);
        }

        for event in bubbled {
            dc.emit_event(event).await?;
        }
        if dc.unique_instance_id() != key {
            return Ok(result);
        }

        if result.status == DialogTurnStatus::Waiting {
            let (interrupted, abandoned) = {
                let mut planning = PlanningContext::load(dc, self.max_plan_history)?;
                let applied = planning.apply_changes();
                planning.save()?;
                (
                    applied && !planning.current_step().is_some_and(PlanStep::is_in_progress),
                    planning.take_abandoned(),
                )
            };
            self.end_abandoned(dc, &dialogs, abandoned).await?;
            if interrupted {
                return self.continue_plan(dc).await;
            }
            return Ok(result);
        }

        log::debug!("step '{}' finished ({:?})", step.dialog_id, result.status);
        let (reprompt, abandoned) = {
            let mut planning = PlanningContext::load(dc, self.max_plan_history)?;
            planning.end_step();
            planning.apply_changes();
            planning.save()?;
            (
                planning.current_step().is_some_and(PlanStep::is_in_progress),
                planning.take_abandoned(),
            )
        };
        self.end_abandoned(dc, &dialogs, abandoned).await?;
        if reprompt {
            self.reprompt_step(dc).await?;
            return Ok(DialogTurnResult::waiting());
        }
        self.continue_plan(dc).await
    }

    /// Nothing left to run: end with the stored result if still active
    fn finish_plan<'a>(
        self,
        dc: &'a mut DialogContext,
    ) -> BoxFuture<'a, DialogResult<DialogTurnResult>> {
        Box::pin(async move {
            if !dc.active_dialog().is_some_and(|active| active.id == self.id) {
                return Ok(DialogTurnResult::empty());
            }
            match self.end_plan(dc).await {
                Ok(result) => Ok(result),
                Err(err) => self.fail(dc, err).await,
            }
        })
    }

    async fn end_plan(&self, dc: &mut DialogContext) -> DialogResult<DialogTurnResult> {
        let planning = PlanningContext::load(dc, self.max_plan_history)?;
        let result = planning.state().result.clone();
        log::info!("'{}' has no steps left, ending", self.id);
        planning.end_dialog(result).await
    }

    /// End the nested instances of running steps that a change discarded
    async fn end_abandoned(
        &self,
        dc: &mut DialogContext,
        dialogs: &Arc<DialogSet>,
        abandoned: Vec<Vec<DialogInstance>>,
    ) -> DialogResult<()> {
        for stack in abandoned {
            let mut child = dc.child(dialogs.clone(), stack);
            child.cancel_stack().await?;
        }
        Ok(())
    }

    fn store_step_stack(
        &self,
        dc: &mut DialogContext,
        stack: Vec<DialogInstance>,
    ) -> DialogResult<()> {
        let mut planning = PlanningContext::load(dc, self.max_plan_history)?;
        if let Some(step) = planning.plan_mut().and_then(|plan| plan.steps.first_mut()) {
            step.dialog_stack = stack;
        }
        planning.save()
    }

    /// Re-send the prompt of a suspended current step
    async fn reprompt_step(&self, dc: &mut DialogContext) -> DialogResult<()> {
        let dialogs = self.install_dependencies()?;
        let step = PlanningContext::load(dc, self.max_plan_history)?
            .current_step()
            .cloned();
        let Some(step) = step.filter(PlanStep::is_in_progress) else {
            return Ok(());
        };
        let mut child = dc.child(dialogs, step.dialog_stack);
        child.reprompt_dialog().await?;
        self.store_step_stack(dc, child.into_stack())
    }

    async fn handle_event(&self, dc: &mut DialogContext, event: &DialogEvent) -> DialogResult<bool> {
        self.install_dependencies()?;
        let mut planning = PlanningContext::load(dc, self.max_plan_history)?;
        let handled = self.evaluator().evaluate(&planning, event.clone()).await?;
        planning.save()?;
        Ok(handled)
    }

    /// Turn a fault into a cancellation of the whole tree
    async fn fail(&self, dc: &mut DialogContext, err: DialogError) -> DialogResult<DialogTurnResult> {
        log::error!("planning dialog '{}' failed: {}", self.id, err);
        dc.cancel_all_dialogs(CancellationReason::Error, Some(error_payload(&err)))
            .await
    }
}

async fn drive_step(
    child: &mut DialogContext,
    consultation: Option<DialogConsultation>,
    step: &PlanStep,
) -> DialogResult<DialogTurnResult> {
    let result = match consultation {
        Some(consultation) => consultation.process(child).await?,
        None => DialogTurnResult::empty(),
    };
    if result.status == DialogTurnStatus::Empty && child.stack().is_empty() {
        log::debug!("begin step '{}'", step.dialog_id);
        return child.begin_dialog(&step.dialog_id, step.options.clone()).await;
    }
    Ok(result)
}

/// `{"message", "stack"}` where the stack lists the error's source chain
fn error_payload(err: &DialogError) -> Value {
    let mut stack = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        stack.push(cause.to_string());
        source = cause.source();
    }
    json!({ "message": err.to_string(), "stack": stack })
}

#[async_trait]
impl Dialog for PlanningDialog {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_dialog(
        &self,
        dc: &mut DialogContext,
        options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        match self.begin_plan(dc, options).await {
            Ok(result) => Ok(result),
            Err(err) => self.fail(dc, err).await,
        }
    }

    async fn consult_dialog(&self, dc: &mut DialogContext) -> DialogResult<DialogConsultation> {
        match self.consult(dc).await {
            Ok(consultation) => Ok(consultation),
            Err(err) => {
                let result = self.fail(dc, err).await?;
                Ok(DialogConsultation::ready(
                    ConsultationDesire::ShouldProcess,
                    result,
                ))
            }
        }
    }

    async fn continue_dialog(&self, dc: &mut DialogContext) -> DialogResult<DialogTurnResult> {
        match self.continue_plan(dc).await {
            Ok(result) => Ok(result),
            Err(err) => self.fail(dc, err).await,
        }
    }

    async fn resume_dialog(
        &self,
        dc: &mut DialogContext,
        _reason: DialogReason,
        _result: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        self.reprompt_step(dc).await?;
        Ok(DialogTurnResult::waiting())
    }

    async fn reprompt_dialog(&self, dc: &mut DialogContext) -> DialogResult<()> {
        self.reprompt_step(dc).await
    }

    async fn end_dialog(
        &self,
        dc: &mut DialogContext,
        instance: DialogInstance,
        reason: DialogReason,
    ) -> DialogResult<()> {
        if reason != DialogReason::CancelCalled {
            return Ok(());
        }
        let state = PlanningState::from_instance(&instance)?;
        let Some(plan) = state.plan else {
            return Ok(());
        };
        for step in plan.steps.into_iter().filter(PlanStep::is_in_progress) {
            log::debug!("cancel suspended step '{}'", step.dialog_id);
            let mut child = dc.child(self.install_dependencies()?, step.dialog_stack);
            child.cancel_stack().await?;
        }
        Ok(())
    }

    async fn on_dialog_event(
        &self,
        dc: &mut DialogContext,
        event: &DialogEvent,
    ) -> DialogResult<bool> {
        match self.handle_event(dc, event).await {
            Ok(handled) => Ok(handled),
            Err(err) => {
                self.fail(dc, err).await?;
                Ok(true)
            }
        }
    }
}
