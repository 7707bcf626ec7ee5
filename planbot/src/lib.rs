// Planbot Library
// Rule-driven dialog planning for conversational bots: rules turn turn events
// into plan changes, the planning dialog runs the resulting plan across turns.

pub mod activity;
pub mod bot;
pub mod config;
pub mod dialogs;
pub mod planning;
pub mod recognizer;
pub mod state;
pub mod storage;
pub mod turn_context;

pub use activity::{Activity, ActivityType, ChannelAccount, ConversationAccount};
pub use bot::{Bot, BotError, RunOutcome, StorageKeys, TurnOutcome};
pub use config::{BotConfig, ConfigError};
pub use dialogs::{
    Dialog, DialogContext, DialogError, DialogEvent, DialogResult, DialogSet, DialogTurnResult,
    DialogTurnStatus,
};
pub use planning::{PlanChangeList, PlanChangeType, PlanningDialog, Rule};
pub use recognizer::{Recognizer, RecognizerResult, RegexRecognizer};
pub use state::StoredBotState;
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use turn_context::TurnContext;
