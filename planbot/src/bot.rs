// Turn driver: load state, run the root dialog, save what changed

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde_json::Value;

use crate::activity::{Activity, ActivityType};
use crate::config::{BotConfig, ConfigError};
use crate::dialogs::{
    Dialog, DialogContext, DialogError, DialogMemory, DialogSet, DialogTurnResult,
};
use crate::state::{DialogState, StoredBotState};
use crate::storage::{Storage, StorageError, StoreItems, ETAG_FIELD, WILDCARD_ETAG};
use crate::turn_context::TurnContext;

/// Errors surfaced to the host
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Activity has no user id")]
    MissingUserId,

    #[error("Activity has no conversation id")]
    MissingConversationId,

    #[error("No storage configured and no state supplied")]
    StorageNotConfigured,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Dialog error: {0}")]
    Dialog(#[from] DialogError),

    #[error("State serialization error: {0}")]
    State(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Storage keys of the two state documents for an activity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageKeys {
    pub user: String,
    pub conversation: String,
}

impl StorageKeys {
    /// Derive keys from the activity's channel, sender and conversation.
    /// Conversation updates often have no sender; the first added member
    /// stands in for it.
    pub fn from_activity(activity: &Activity) -> Result<Self, BotError> {
        let user_id = activity
            .from
            .as_ref()
            .map(|from| from.id.as_str())
            .filter(|id| !id.is_empty())
            .or_else(|| {
                if activity.activity_type == ActivityType::ConversationUpdate {
                    activity
                        .members_added
                        .first()
                        .map(|member| member.id.as_str())
                        .filter(|id| !id.is_empty())
                } else {
                    None
                }
            })
            .ok_or(BotError::MissingUserId)?;
        let conversation_id = activity
            .conversation
            .as_ref()
            .map(|conversation| conversation.id.as_str())
            .filter(|id| !id.is_empty())
            .ok_or(BotError::MissingConversationId)?;

        Ok(Self {
            user: format!("{}/users/{}", activity.channel_id, user_id),
            conversation: format!("{}/conversations/{}", activity.channel_id, conversation_id),
        })
    }
}

/// Result of one turn
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub result: DialogTurnResult,
    /// State after the turn, for callers that persist it themselves
    pub state: StoredBotState,
    /// Whether the state was written to storage
    pub saved: bool,
}

/// Result of [`Bot::run`]
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub turn: TurnOutcome,
    /// Activities the bot sent during the turn
    pub activities: Vec<Activity>,
}

/// Runs a root dialog turn by turn over persisted state
pub struct Bot {
    root_id: String,
    dialogs: Arc<DialogSet>,
    storage: Option<Arc<dyn Storage>>,
    expire_after: Option<chrono::Duration>,
}

impl Bot {
    pub fn new(root: Arc<dyn Dialog>) -> Result<Self, BotError> {
        let root_id = root.id().to_string();
        let mut dialogs = DialogSet::new();
        dialogs.add(root)?;
        Ok(Self {
            root_id,
            dialogs: Arc::new(dialogs),
            storage: None,
            expire_after: None,
        })
    }

    /// Bot with the storage and expiry settings of `config`
    pub fn from_config(root: Arc<dyn Dialog>, config: &BotConfig) -> Result<Self, BotError> {
        let mut bot = Self::new(root)?.with_storage(config.build_storage()?);
        bot.expire_after = config.expire_after();
        Ok(bot)
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_expire_after(mut self, window: chrono::Duration) -> Self {
        self.expire_after = Some(window);
        self
    }

    pub fn storage(&self) -> Option<&Arc<dyn Storage>> {
        self.storage.as_ref()
    }

    /// Process one turn.
    ///
    /// With `state` the caller owns persistence and nothing is written;
    /// otherwise state is read from storage and written back if it changed.
    pub async fn on_turn(
        &self,
        turn: Arc<TurnContext>,
        state: Option<StoredBotState>,
    ) -> Result<TurnOutcome, BotError> {
        let keys = StorageKeys::from_activity(turn.activity())?;

        let (snapshot, loaded) = match state {
            Some(state) => (state, false),
            None => (self.load(&keys).await?, true),
        };
        let mut state = snapshot.clone();

        let now = Utc::now();
        if let Some(window) = self.expire_after {
            if state.conversation_state.is_expired(now, window) {
                log::info!("conversation '{}' expired, resetting state", keys.conversation);
                state.conversation_state.reset();
            }
        }
        state.conversation_state.last_access = Some(now);

        let stack = state
            .conversation_state
            .dialogs
            .get_or_insert_with(DialogState::default)
            .dialog_stack
            .clone();
        let memory = Arc::new(Mutex::new(DialogMemory::new(
            state.user_state.values.clone(),
            state.conversation_state.values.clone(),
        )));

        let mut dc = DialogContext::new(self.dialogs.clone(), turn.clone(), memory.clone(), stack);
        let result = if dc.stack().is_empty() {
            log::debug!("begin root dialog '{}'", self.root_id);
            dc.begin_dialog(&self.root_id, None).await?
        } else {
            dc.continue_dialog().await?
        };
        dc.propagate_cancellation().await?;
        if let Some(cancellation) = turn.take_cancellation() {
            log::info!("dialogs cancelled this turn ({:?})", cancellation.reason);
        }

        state.conversation_state.dialogs = Some(DialogState {
            dialog_stack: dc.into_stack(),
        });
        let (user, conversation) = memory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .into_parts();
        state.user_state.values = user;
        state.conversation_state.values = conversation;

        let saved = if loaded {
            self.save(&keys, &snapshot, &state).await?
        } else {
            false
        };

        Ok(TurnOutcome {
            result,
            state,
            saved,
        })
    }

    /// Process `activity` on a fresh turn context and collect the replies
    pub async fn run(
        &self,
        activity: Activity,
        state: Option<StoredBotState>,
    ) -> Result<RunOutcome, BotError> {
        let turn = Arc::new(TurnContext::new(activity));
        let outcome = self.on_turn(turn.clone(), state).await?;
        Ok(RunOutcome {
            turn: outcome,
            activities: turn.take_responses(),
        })
    }

    async fn load(&self, keys: &StorageKeys) -> Result<StoredBotState, BotError> {
        let storage = self.storage.as_ref().ok_or(BotError::StorageNotConfigured)?;
        let mut items = storage
            .read(&[keys.user.clone(), keys.conversation.clone()])
            .await?;
        Ok(StoredBotState::from_documents(
            items.remove(&keys.user),
            items.remove(&keys.conversation),
        )?)
    }

    /// Write the documents that differ from the snapshot, overwriting
    /// whatever is stored
    async fn save(
        &self,
        keys: &StorageKeys,
        snapshot: &StoredBotState,
        state: &StoredBotState,
    ) -> Result<bool, BotError> {
        let mut changes = StoreItems::new();
        if state.user_state != snapshot.user_state {
            changes.insert(keys.user.clone(), wildcard(serde_json::to_value(&state.user_state)?));
        }
        if state.conversation_state != snapshot.conversation_state {
            changes.insert(
                keys.conversation.clone(),
                wildcard(serde_json::to_value(&state.conversation_state)?),
            );
        }
        if changes.is_empty() {
            log::debug!("state unchanged, skipping save");
            return Ok(false);
        }

        let storage = self.storage.as_ref().ok_or(BotError::StorageNotConfigured)?;
        log::debug!("saving {} state document(s)", changes.len());
        storage.write(changes).await?;
        Ok(true)
    }
}

fn wildcard(mut document: Value) -> Value {
    if let Value::Object(map) = &mut document {
        map.insert(ETAG_FIELD.to_string(), Value::String(WILDCARD_ETAG.to_string()));
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ChannelAccount;
    use crate::dialogs::SendActivity;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    #[test]
    fn test_keys_from_message() {
        let activity = Activity::message("msteams", "conv-1", "user-1", "hi");
        let keys = StorageKeys::from_activity(&activity).unwrap();
        assert_eq!(keys.user, "msteams/users/user-1");
        assert_eq!(keys.conversation, "msteams/conversations/conv-1");
    }

    #[test]
    fn test_keys_from_conversation_update_member() {
        let activity =
            Activity::conversation_update("msteams", "conv-1", vec![ChannelAccount::new("29:abc")]);
        let keys = StorageKeys::from_activity(&activity).unwrap();
        assert_eq!(keys.user, "msteams/users/29:abc");
    }

    #[test]
    fn test_missing_ids() {
        let activity = Activity::conversation_update("msteams", "conv-1", Vec::new());
        assert!(matches!(
            StorageKeys::from_activity(&activity),
            Err(BotError::MissingUserId)
        ));

        let mut activity = Activity::message("msteams", "conv-1", "user-1", "hi");
        activity.conversation = None;
        assert!(matches!(
            StorageKeys::from_activity(&activity),
            Err(BotError::MissingConversationId)
        ));
    }

    #[tokio::test]
    async fn test_save_skips_unchanged_documents() {
        let storage = Arc::new(MemoryStorage::new());
        let bot = Bot::new(Arc::new(SendActivity::new("main", "hi")))
            .unwrap()
            .with_storage(storage.clone());
        let keys = StorageKeys::from_activity(&Activity::message("test", "c", "u", "hi")).unwrap();

        let mut snapshot = StoredBotState::default();
        snapshot.user_state.values.insert("name".into(), json!("Alice"));
        assert!(!bot.save(&keys, &snapshot, &snapshot.clone()).await.unwrap());
        assert!(storage.is_empty());

        let mut state = snapshot.clone();
        state.conversation_state.last_access = Some(Utc::now());
        assert!(bot.save(&keys, &snapshot, &state).await.unwrap());
        assert_eq!(storage.len(), 1);
        let stored = storage.read(&[keys.conversation.clone()]).await.unwrap();
        assert!(stored[&keys.conversation]["_lastAccess"].is_string());
    }
}
