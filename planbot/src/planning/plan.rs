// Plan model and the planning dialog's persisted state

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dialogs::{DialogInstance, DialogResult};

/// One queued unit of work
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    /// Dialog that runs this step
    pub dialog_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    /// Ordering tags, see `PlanChangeType::DoStepsBeforeTags`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Nested stack while the step is running
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dialog_stack: Vec<DialogInstance>,
}

impl PlanStep {
    pub fn new(dialog_id: impl Into<String>) -> Self {
        Self {
            dialog_id: dialog_id.into(),
            options: None,
            tags: Vec::new(),
            dialog_stack: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// True when the step started and is suspended mid-way
    pub fn is_in_progress(&self) -> bool {
        !self.dialog_stack.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanStatus {
    #[default]
    Active,
    Completed,
    Cancelled,
}

/// Ordered queue of steps; step 0 is current
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub status: PlanStatus,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self {
            steps,
            status: PlanStatus::Active,
        }
    }

    pub fn current_step(&self) -> Option<&PlanStep> {
        self.steps.first()
    }

    /// A plan without steps has nothing left to run
    pub fn is_ended(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Persisted state of one planning dialog instance
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningState {
    /// Options the dialog was begun with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    /// Ended plans, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Plan>,
    /// Value returned to the parent when the dialog ends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl PlanningState {
    /// Load from a dialog instance; a fresh instance has a null state
    pub fn from_instance(instance: &DialogInstance) -> DialogResult<Self> {
        if instance.state.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(instance.state.clone())?)
    }

    pub fn to_value(&self) -> DialogResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Move the active plan into the history with `status`
    pub fn archive_plan(&mut self, status: PlanStatus, max_history: usize) {
        if let Some(mut plan) = self.plan.take() {
            plan.status = status;
            self.history.push(plan);
            if self.history.len() > max_history {
                let excess = self.history.len() - max_history;
                self.history.drain(..excess);
            }
        }
    }
}
