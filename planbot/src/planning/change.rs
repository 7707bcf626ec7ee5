// Change lists: proposed plan mutations produced by rules

use std::collections::BTreeSet;

use super::plan::PlanStep;

/// How a change list mutates the plan
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanChangeType {
    /// Archive the active plan and start a new one
    NewPlan,
    /// Insert steps ahead of the current step
    DoSteps,
    /// Insert steps before the first step carrying one of the change's tags
    DoStepsBeforeTags,
    /// Append steps to the plan
    DoStepsLater,
    /// Replace the active plan's steps
    ReplacePlan,
    /// End the active plan, running the change's steps as a new plan
    EndPlan,
}

impl PlanChangeType {
    /// Changes that start or replace the plan as a whole
    pub fn starts_plan(self) -> bool {
        matches!(self, PlanChangeType::NewPlan | PlanChangeType::ReplacePlan)
    }
}

/// A proposed mutation to a plan.
///
/// The matched intents and entities only serve conflict resolution between
/// rules; they play no part in applying the change.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanChangeList {
    pub change_type: PlanChangeType,
    pub steps: Vec<PlanStep>,
    pub tags: Vec<String>,
    pub intents_matched: BTreeSet<String>,
    pub entities_matched: BTreeSet<String>,
}

impl PlanChangeList {
    pub fn new(change_type: PlanChangeType, steps: Vec<PlanStep>) -> Self {
        Self {
            change_type,
            steps,
            tags: Vec::new(),
            intents_matched: BTreeSet::new(),
            entities_matched: BTreeSet::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_intents<I, S>(mut self, intents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.intents_matched = intents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities_matched = entities.into_iter().map(Into::into).collect();
        self
    }

    /// Two change lists conflict when they share a matched intent, or when
    /// neither matched any intent.
    pub fn overlaps(&self, other: &PlanChangeList) -> bool {
        if self.intents_matched.is_empty() && other.intents_matched.is_empty() {
            return true;
        }
        !self.intents_matched.is_disjoint(&other.intents_matched)
    }
}
