// Planning: rule-driven plans executed by a planning dialog
//
// Per turn:
// - Rules are evaluated against the incoming event and queue change lists
// - Queued changes are applied to the plan when the plan is next consulted
// - The plan's current step runs on a nested dialog stack
// - When the step completes the plan advances, when the plan is empty the
//   planning dialog ends with its result value

pub mod change;
pub mod context;
pub mod dialog;
pub mod evaluator;
pub mod plan;
pub mod rules;


pub use change::{PlanChangeList, PlanChangeType};
pub use context::PlanningContext;
pub use dialog::PlanningDialog;
pub use evaluator::{select_best_matches, RuleEvaluator};
pub use plan::{Plan, PlanStatus, PlanStep, PlanningState};
pub use rules::{EventRule, FallbackRule, IntentRule, Rule};

/// Event names the planning dialog evaluates rules for
pub mod events {
    pub const BEGIN_DIALOG: &str = "beginDialog";
    pub const CONSULT_DIALOG: &str = "consultDialog";
    pub const ACTIVITY_RECEIVED: &str = "activityReceived";
    pub const UTTERANCE_RECOGNIZED: &str = "utteranceRecognized";
    pub const FALLBACK: &str = "fallback";
}
