use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use planbot::dialogs::{
    CancelAllDialogs, DialogInstance, DialogMemory, DialogReason, DialogSet, DialogTurnStatus,
    EmitEvent, SendActivity, TextInput,
};
use planbot::planning::{EventRule, FallbackRule, IntentRule, PlanChangeType};
use planbot::{
    Activity, Bot, Dialog, DialogContext, DialogError, DialogResult, DialogTurnResult,
    MemoryStorage, PlanningDialog, RegexRecognizer, RunOutcome, TurnContext,
};
use serde_json::{json, Value};

fn message(text: &str) -> Activity {
    Activity::message("test", "conv-1", "user-1", text)
}

fn texts(outcome: &RunOutcome) -> Vec<String> {
    outcome
        .activities
        .iter()
        .filter_map(|a| a.text.clone())
        .collect()
}

fn ask_name_steps() -> Vec<Arc<dyn Dialog>> {
    vec![
        Arc::new(TextInput::new("askName", "What is your name?").with_property("user.name"))
            as Arc<dyn Dialog>,
        Arc::new(SendActivity::new("greet", "Nice to meet you, {user.name}!")),
    ]
}

fn recognizer() -> RegexRecognizer {
    RegexRecognizer::new()
        .with_intent("greeting", r"(?i)\b(hi|hello)\b")
        .unwrap()
        .with_intent("help", r"(?i)\bhelp\b")
        .unwrap()
        .with_intent("cancel", r"(?i)\bcancel\b")
        .unwrap()
}

fn bot(root: PlanningDialog) -> Bot {
    Bot::new(Arc::new(root))
        .unwrap()
        .with_storage(Arc::new(MemoryStorage::new()))
}

/// Step that always fails
struct Exploding;

#[async_trait]
impl Dialog for Exploding {
    fn id(&self) -> &str {
        "explode"
    }

    async fn begin_dialog(
        &self,
        _dc: &mut DialogContext,
        _options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        Err(DialogError::StepFailed {
            step: "explode".into(),
            message: "boom".into(),
        })
    }
}

/// Step that waits on begin and counts how often its instance is ended
struct Tracked {
    id: &'static str,
    fail_on_continue: bool,
    ends: Arc<AtomicUsize>,
}

impl Tracked {
    fn new(id: &'static str, fail_on_continue: bool) -> (Self, Arc<AtomicUsize>) {
        let ends = Arc::new(AtomicUsize::new(0));
        let dialog = Self {
            id,
            fail_on_continue,
            ends: ends.clone(),
        };
        (dialog, ends)
    }
}

#[async_trait]
impl Dialog for Tracked {
    fn id(&self) -> &str {
        self.id
    }

    async fn begin_dialog(
        &self,
        _dc: &mut DialogContext,
        _options: Option<Value>,
    ) -> DialogResult<DialogTurnResult> {
        Ok(DialogTurnResult::waiting())
    }

    async fn continue_dialog(&self, dc: &mut DialogContext) -> DialogResult<DialogTurnResult> {
        if self.fail_on_continue {
            return Err(DialogError::StepFailed {
                step: self.id.into(),
                message: "lost connection".into(),
            });
        }
        dc.end_dialog(None).await
    }

    async fn end_dialog(
        &self,
        _dc: &mut DialogContext,
        _instance: DialogInstance,
        _reason: DialogReason,
    ) -> DialogResult<()> {
        self.ends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_ask_name_end_to_end() {
    let root = PlanningDialog::new("main").with_rule(
        EventRule::new(["beginDialog"], ask_name_steps()).with_change_type(PlanChangeType::NewPlan),
    );
    let bot = bot(root);

    let first = bot.run(message("hi"), None).await.unwrap();
    assert_eq!(first.turn.result.status, DialogTurnStatus::Waiting);
    assert_eq!(texts(&first), vec!["What is your name?"]);
    assert!(first.turn.saved);

    let second = bot.run(message("Alice"), None).await.unwrap();
    assert_eq!(second.turn.result.status, DialogTurnStatus::Complete);
    assert_eq!(texts(&second), vec!["Nice to meet you, Alice!"]);
    assert_eq!(
        second.turn.state.user_state.values.get("name"),
        Some(&json!("Alice"))
    );
    let stack = &second.turn.state.conversation_state.dialogs.as_ref().unwrap().dialog_stack;
    assert!(stack.is_empty());
}

#[tokio::test]
async fn test_begin_without_value_completes_empty() {
    let root = PlanningDialog::new("main").with_rule(EventRule::new(
        ["beginDialog"],
        vec![Arc::new(SendActivity::new("say", "done")) as Arc<dyn Dialog>],
    ));
    let bot = bot(root);
    let outcome = bot.run(message("go"), None).await.unwrap();
    assert_eq!(outcome.turn.result, DialogTurnResult::complete(None));
    assert_eq!(texts(&outcome), vec!["done"]);
}

#[tokio::test]
async fn test_seeded_value_is_initial_result() {
    let inner = PlanningDialog::new("inner").with_rule(EventRule::new(
        ["beginDialog"],
        vec![Arc::new(SendActivity::new("say", "working")) as Arc<dyn Dialog>],
    ));
    let mut dialogs = DialogSet::new();
    dialogs.add(Arc::new(inner)).unwrap();
    let turn = Arc::new(TurnContext::new(message("go")));
    let mut dc = DialogContext::new(
        Arc::new(dialogs),
        turn.clone(),
        Arc::new(std::sync::Mutex::new(DialogMemory::default())),
        Vec::new(),
    );

    let result = dc
        .begin_dialog("inner", Some(json!({"value": {"n": [1, 2]}})))
        .await
        .unwrap();
    assert_eq!(result, DialogTurnResult::complete(Some(json!({"n": [1, 2]}))));
    assert_eq!(turn.take_responses().len(), 1);
    assert!(dc.stack().is_empty());
}

#[tokio::test]
async fn test_interruption_reprompts_suspended_step() {
    let root = PlanningDialog::new("main")
        .with_recognizer(recognizer())
        .with_rule(
            IntentRule::new("greeting", ask_name_steps()).with_change_type(PlanChangeType::NewPlan),
        )
        .with_rule(IntentRule::new(
            "help",
            vec![Arc::new(SendActivity::new("helpText", "I can learn your name.")) as Arc<dyn Dialog>],
        ));
    let bot = bot(root);

    let first = bot.run(message("hello"), None).await.unwrap();
    assert_eq!(texts(&first), vec!["What is your name?"]);

    let second = bot.run(message("help"), None).await.unwrap();
    assert_eq!(second.turn.result.status, DialogTurnStatus::Waiting);
    assert_eq!(
        texts(&second),
        vec!["I can learn your name.", "What is your name?"]
    );

    let third = bot.run(message("Bob"), None).await.unwrap();
    assert_eq!(texts(&third), vec!["Nice to meet you, Bob!"]);
    assert_eq!(third.turn.result.status, DialogTurnStatus::Complete);
}

#[tokio::test]
async fn test_fallback_only_without_active_plan() {
    let root = PlanningDialog::new("main")
        .with_recognizer(recognizer())
        .with_rule(
            IntentRule::new("greeting", ask_name_steps()).with_change_type(PlanChangeType::NewPlan),
        )
        .with_rule(FallbackRule::new(vec![
            Arc::new(SendActivity::new("sorry", "Sorry, I did not get that.")) as Arc<dyn Dialog>,
        ]));
    let bot = bot(root);

    let first = bot.run(message("blah"), None).await.unwrap();
    assert_eq!(texts(&first), vec!["Sorry, I did not get that."]);
    assert_eq!(first.turn.result.status, DialogTurnStatus::Complete);

    let second = bot.run(message("hello"), None).await.unwrap();
    assert_eq!(texts(&second), vec!["What is your name?"]);

    // The running plan absorbs the unrecognized utterance
    let third = bot.run(message("Zed"), None).await.unwrap();
    assert_eq!(texts(&third), vec!["Nice to meet you, Zed!"]);
}

#[tokio::test]
async fn test_explicit_cancel_unwinds_everything() {
    let root = PlanningDialog::new("main")
        .with_recognizer(recognizer())
        .with_rule(
            IntentRule::new("greeting", ask_name_steps()).with_change_type(PlanChangeType::NewPlan),
        )
        .with_rule(IntentRule::new(
            "cancel",
            vec![Arc::new(CancelAllDialogs::new("cancelAll")) as Arc<dyn Dialog>],
        ));
    let bot = bot(root);

    bot.run(message("hi"), None).await.unwrap();
    let outcome = bot.run(message("cancel"), None).await.unwrap();
    assert_eq!(outcome.turn.result.status, DialogTurnStatus::Cancelled);
    assert_eq!(outcome.turn.result.result, Some(json!({"reason": "cancelled"})));
    assert!(texts(&outcome).is_empty());
    let stack = &outcome.turn.state.conversation_state.dialogs.as_ref().unwrap().dialog_stack;
    assert!(stack.is_empty());

    // A fresh start afterwards
    let again = bot.run(message("hi"), None).await.unwrap();
    assert_eq!(texts(&again), vec!["What is your name?"]);
}

#[tokio::test]
async fn test_step_failure_cancels_with_error_payload() {
    let root = PlanningDialog::new("main").with_rule(EventRule::new(
        ["beginDialog"],
        vec![
            Arc::new(Exploding) as Arc<dyn Dialog>,
            Arc::new(SendActivity::new("after", "unreachable")),
        ],
    ));
    let bot = bot(root);

    let outcome = bot.run(message("hi"), None).await.unwrap();
    assert_eq!(outcome.turn.result.status, DialogTurnStatus::Cancelled);
    let payload = outcome.turn.result.result.unwrap();
    assert_eq!(payload["reason"], json!("error"));
    assert_eq!(
        payload["details"]["message"],
        json!("Step 'explode' failed: boom")
    );
    assert!(payload["details"]["stack"].is_array());
    assert!(outcome.activities.is_empty());
}

#[tokio::test]
async fn test_nested_failure_removes_container() {
    let inner = PlanningDialog::new("inner").with_rule(EventRule::new(
        ["beginDialog"],
        vec![Arc::new(Exploding) as Arc<dyn Dialog>],
    ));
    let root = PlanningDialog::new("main").with_rule(EventRule::new(
        ["beginDialog"],
        vec![
            Arc::new(SendActivity::new("before", "starting")) as Arc<dyn Dialog>,
            Arc::new(inner),
            Arc::new(SendActivity::new("after", "unreachable")),
        ],
    ));
    let bot = bot(root);

    let outcome = bot.run(message("hi"), None).await.unwrap();
    assert_eq!(texts(&outcome), vec!["starting"]);
    assert_eq!(outcome.turn.result.status, DialogTurnStatus::Cancelled);
    assert_eq!(outcome.turn.result.result.unwrap()["reason"], json!("error"));
    let stack = &outcome.turn.state.conversation_state.dialogs.as_ref().unwrap().dialog_stack;
    assert!(stack.is_empty());
}

#[tokio::test]
async fn test_nested_planning_dialog_completes_into_parent() {
    let inner = PlanningDialog::new("inner").with_rule(
        EventRule::new(["beginDialog"], ask_name_steps()).with_change_type(PlanChangeType::NewPlan),
    );
    let root = PlanningDialog::new("main").with_rule(EventRule::new(
        ["beginDialog"],
        vec![
            Arc::new(inner) as Arc<dyn Dialog>,
            Arc::new(SendActivity::new("bye", "Bye {user.name}.")),
        ],
    ));
    let bot = bot(root);

    let first = bot.run(message("hi"), None).await.unwrap();
    assert_eq!(first.turn.result.status, DialogTurnStatus::Waiting);
    assert_eq!(texts(&first), vec!["What is your name?"]);

    let second = bot.run(message("Ada"), None).await.unwrap();
    assert_eq!(
        texts(&second),
        vec!["Nice to meet you, Ada!", "Bye Ada."]
    );
    assert_eq!(second.turn.result.status, DialogTurnStatus::Complete);
}

#[tokio::test]
async fn test_bubbling_event_reaches_planner_rules() {
    let root = PlanningDialog::new("main")
        .with_rule(
            EventRule::new(
                ["beginDialog"],
                vec![
                    Arc::new(EmitEvent::new("emit", "refresh")) as Arc<dyn Dialog>,
                    Arc::new(SendActivity::new("done", "Done")),
                ],
            )
            .with_change_type(PlanChangeType::NewPlan),
        )
        .with_rule(EventRule::new(
            ["refresh"],
            vec![Arc::new(SendActivity::new("refreshed", "Refreshed")) as Arc<dyn Dialog>],
        ));
    let bot = bot(root);

    let outcome = bot.run(message("hi"), None).await.unwrap();
    assert_eq!(texts(&outcome), vec!["Refreshed", "Done"]);
    assert_eq!(outcome.turn.result.status, DialogTurnStatus::Complete);
}

#[tokio::test]
async fn test_event_activity_triggers_rule() {
    let root = PlanningDialog::new("main")
        .with_rule(
            EventRule::new(["beginDialog"], ask_name_steps()).with_change_type(PlanChangeType::NewPlan),
        )
        .with_rule(EventRule::new(
            ["ping"],
            vec![Arc::new(SendActivity::new("pong", "pong")) as Arc<dyn Dialog>],
        ));
    let bot = bot(root);

    bot.run(message("hi"), None).await.unwrap();
    let ping = Activity::event("test", "conv-1", "user-1", "ping", None);
    let outcome = bot.run(ping, None).await.unwrap();
    assert_eq!(texts(&outcome), vec!["pong", "What is your name?"]);
    assert_eq!(outcome.turn.result.status, DialogTurnStatus::Waiting);
}

#[tokio::test]
async fn test_failing_suspended_step_is_ended_once() {
    let (flaky, ends) = Tracked::new("flaky", true);
    let root = PlanningDialog::new("main").with_rule(EventRule::new(
        ["beginDialog"],
        vec![Arc::new(flaky) as Arc<dyn Dialog>],
    ));
    let bot = bot(root);

    let first = bot.run(message("start"), None).await.unwrap();
    assert_eq!(first.turn.result.status, DialogTurnStatus::Waiting);
    assert_eq!(ends.load(Ordering::SeqCst), 0);

    let second = bot.run(message("again"), None).await.unwrap();
    assert_eq!(second.turn.result.status, DialogTurnStatus::Cancelled);
    assert_eq!(second.turn.result.result.unwrap()["reason"], json!("error"));
    assert_eq!(ends.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_new_plan_ends_running_step() {
    let (waiting, ends) = Tracked::new("waiting", false);
    let root = PlanningDialog::new("main")
        .with_recognizer(recognizer())
        .with_rule(
            IntentRule::new("greeting", vec![Arc::new(waiting) as Arc<dyn Dialog>])
                .with_change_type(PlanChangeType::NewPlan),
        )
        .with_rule(
            IntentRule::new(
                "help",
                vec![Arc::new(SendActivity::new("helpText", "Starting over.")) as Arc<dyn Dialog>],
            )
            .with_change_type(PlanChangeType::NewPlan),
        );
    let bot = bot(root);

    bot.run(message("hi"), None).await.unwrap();
    assert_eq!(ends.load(Ordering::SeqCst), 0);

    let outcome = bot.run(message("help"), None).await.unwrap();
    assert_eq!(texts(&outcome), vec!["Starting over."]);
    assert_eq!(ends.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.turn.result.status, DialogTurnStatus::Complete);
}
