//! Demo bot: greets, learns the user's name, answers help, cancels on request.

use std::sync::Arc;

use planbot::dialogs::{CancelAllDialogs, SendActivity, TextInput};
use planbot::planning::{FallbackRule, IntentRule};
use planbot::{BotConfig, ConfigError, Dialog, PlanChangeType, PlanningDialog, RegexRecognizer};

const DEFAULT_INTENTS: &[(&str, &str)] = &[
    ("greeting", r"(?i)\b(hi|hello|hey)\b"),
    ("help", r"(?i)\b(help|\?)"),
    ("cancel", r"(?i)\b(cancel|stop|quit)\b"),
];

/// Recognizer from the config, or the built-in patterns when it has none
fn recognizer(config: &BotConfig) -> Result<RegexRecognizer, ConfigError> {
    if !config.recognizer.intents.is_empty() {
        return config.build_recognizer();
    }
    let mut recognizer = RegexRecognizer::new();
    for (name, pattern) in DEFAULT_INTENTS {
        recognizer = recognizer.with_intent(name, pattern)?;
    }
    Ok(recognizer)
}

pub fn build_root(config: &BotConfig) -> Result<PlanningDialog, ConfigError> {
    let ask_name: Vec<Arc<dyn Dialog>> = vec![
        Arc::new(TextInput::new("askName", "Hi! What is your name?").with_property("user.name")),
        Arc::new(SendActivity::new("greet", "Nice to meet you, {user.name}!")),
    ];
    let help: Vec<Arc<dyn Dialog>> = vec![Arc::new(SendActivity::new(
        "help",
        "Say hello and I will ask your name. Say cancel to start over.",
    ))];
    let cancel: Vec<Arc<dyn Dialog>> = vec![Arc::new(CancelAllDialogs::new("cancelAll"))];
    let fallback: Vec<Arc<dyn Dialog>> = vec![Arc::new(SendActivity::new(
        "apology",
        "Sorry, I didn't understand that. Try saying hello.",
    ))];

    Ok(PlanningDialog::new("main")
        .with_recognizer(recognizer(config)?)
        .with_max_plan_history(config.max_plan_history)
        .with_rule(IntentRule::new("greeting", ask_name).with_change_type(PlanChangeType::NewPlan))
        .with_rule(IntentRule::new("help", help).with_change_type(PlanChangeType::DoSteps))
        .with_rule(IntentRule::new("cancel", cancel).with_change_type(PlanChangeType::DoSteps))
        .with_rule(FallbackRule::new(fallback)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use planbot::{Activity, Bot, MemoryStorage};

    fn texts(activities: &[Activity]) -> Vec<String> {
        activities.iter().filter_map(|a| a.text.clone()).collect()
    }

    #[tokio::test]
    async fn test_demo_conversation() {
        let root = build_root(&BotConfig::default()).unwrap();
        let bot = Bot::new(Arc::new(root))
            .unwrap()
            .with_storage(Arc::new(MemoryStorage::new()));
        let say = |text: &str| Activity::message("console", "demo", "user", text);

        let first = bot.run(say("hello"), None).await.unwrap();
        assert_eq!(texts(&first.activities), vec!["Hi! What is your name?"]);

        let second = bot.run(say("Grace"), None).await.unwrap();
        assert_eq!(texts(&second.activities), vec!["Nice to meet you, Grace!"]);

        let third = bot.run(say("what now"), None).await.unwrap();
        assert_eq!(
            texts(&third.activities),
            vec!["Sorry, I didn't understand that. Try saying hello."]
        );
    }
}
