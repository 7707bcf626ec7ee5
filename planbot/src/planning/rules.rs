// Rules: map an event to proposed plan changes

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::change::{PlanChangeList, PlanChangeType};
use super::context::PlanningContext;
use super::events;
use super::plan::PlanStep;
use crate::dialogs::{Dialog, DialogEvent, DialogResult};
use crate::recognizer::RecognizerResult;

/// A unit that maps a turn event to zero or more change lists
#[async_trait]
pub trait Rule: Send + Sync {
    /// Step dialogs the rule's change lists refer to. They are installed as
    /// children of the planning dialog before its first evaluation.
    fn steps(&self) -> Vec<Arc<dyn Dialog>>;

    /// Propose changes for `event`. Must not mutate the plan; changes are
    /// queued by the evaluator.
    async fn evaluate(
        &self,
        planning: &PlanningContext<'_>,
        event: &DialogEvent,
    ) -> DialogResult<Vec<PlanChangeList>>;
}

fn plan_steps(steps: &[Arc<dyn Dialog>]) -> Vec<PlanStep> {
    steps.iter().map(|step| PlanStep::new(step.id())).collect()
}

/// Matches events by name
pub struct EventRule {
    events: Vec<String>,
    steps: Vec<Arc<dyn Dialog>>,
    change_type: PlanChangeType,
}

impl EventRule {
    pub fn new<I, S>(events: I, steps: Vec<Arc<dyn Dialog>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: events.into_iter().map(Into::into).collect(),
            steps,
            change_type: PlanChangeType::DoSteps,
        }
    }

    pub fn with_change_type(mut self, change_type: PlanChangeType) -> Self {
        self.change_type = change_type;
        self
    }
}

#[async_trait]
impl Rule for EventRule {
    fn steps(&self) -> Vec<Arc<dyn Dialog>> {
        self.steps.clone()
    }

    async fn evaluate(
        &self,
        _planning: &PlanningContext<'_>,
        event: &DialogEvent,
    ) -> DialogResult<Vec<PlanChangeList>> {
        if !self.events.iter().any(|name| name == &event.name) {
            return Ok(Vec::new());
        }
        Ok(vec![PlanChangeList::new(
            self.change_type,
            plan_steps(&self.steps),
        )])
    }
}

/// Matches a recognized utterance carrying an intent and required entities
pub struct IntentRule {
    intent: String,
    entities: Vec<String>,
    steps: Vec<Arc<dyn Dialog>>,
    change_type: PlanChangeType,
}

impl IntentRule {
    pub fn new(intent: impl Into<String>, steps: Vec<Arc<dyn Dialog>>) -> Self {
        Self {
            intent: intent.into(),
            entities: Vec::new(),
            steps,
            change_type: PlanChangeType::DoSteps,
        }
    }

    pub fn with_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities = entities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_change_type(mut self, change_type: PlanChangeType) -> Self {
        self.change_type = change_type;
        self
    }
}

#[async_trait]
impl Rule for IntentRule {
    fn steps(&self) -> Vec<Arc<dyn Dialog>> {
        self.steps.clone()
    }

    async fn evaluate(
        &self,
        _planning: &PlanningContext<'_>,
        event: &DialogEvent,
    ) -> DialogResult<Vec<PlanChangeList>> {
        if event.name != events::UTTERANCE_RECOGNIZED {
            return Ok(Vec::new());
        }
        let recognized: RecognizerResult = match &event.value {
            Some(value) => serde_json::from_value(value.clone())?,
            None => return Ok(Vec::new()),
        };
        if !recognized.intents.contains_key(&self.intent) {
            return Ok(Vec::new());
        }
        if !self
            .entities
            .iter()
            .all(|entity| recognized.entities.contains_key(entity))
        {
            return Ok(Vec::new());
        }

        log::debug!(
            "intent rule '{}' matched with entities {:?}",
            self.intent,
            self.entities
        );
        let entities: BTreeSet<String> = self.entities.iter().cloned().collect();
        Ok(vec![PlanChangeList::new(
            self.change_type,
            plan_steps(&self.steps),
        )
        .with_intents([self.intent.clone()])
        .with_entities(entities)])
    }
}

/// Runs when nothing else understood the utterance
pub struct FallbackRule {
    steps: Vec<Arc<dyn Dialog>>,
    change_type: PlanChangeType,
}

impl FallbackRule {
    pub fn new(steps: Vec<Arc<dyn Dialog>>) -> Self {
        Self {
            steps,
            change_type: PlanChangeType::DoSteps,
        }
    }

    pub fn with_change_type(mut self, change_type: PlanChangeType) -> Self {
        self.change_type = change_type;
        self
    }
}

#[async_trait]
impl Rule for FallbackRule {
    fn steps(&self) -> Vec<Arc<dyn Dialog>> {
        self.steps.clone()
    }

    async fn evaluate(
        &self,
        _planning: &PlanningContext<'_>,
        event: &DialogEvent,
    ) -> DialogResult<Vec<PlanChangeList>> {
        if event.name != events::FALLBACK {
            return Ok(Vec::new());
        }
        Ok(vec![PlanChangeList::new(
            self.change_type,
            plan_steps(&self.steps),
        )])
    }
}
