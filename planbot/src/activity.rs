// Activity types exchanged with the channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of activity received from or sent to a channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityType {
    Message,
    Event,
    ConversationUpdate,
    Typing,
    #[serde(other)]
    Unknown,
}

/// A user or bot account on a channel
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// The conversation an activity belongs to
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A single conversational activity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Event name for `event` activities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Accounts that joined, for `conversationUpdate` activities
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members_added: Vec<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

impl Activity {
    fn base(
        activity_type: ActivityType,
        channel_id: &str,
        conversation_id: &str,
        user_id: &str,
    ) -> Self {
        Self {
            activity_type,
            id: Some(uuid::Uuid::new_v4().to_string()),
            timestamp: Some(Utc::now()),
            channel_id: channel_id.to_string(),
            from: Some(ChannelAccount::new(user_id)),
            recipient: None,
            conversation: Some(ConversationAccount {
                id: conversation_id.to_string(),
                name: None,
            }),
            text: None,
            name: None,
            value: None,
            members_added: Vec::new(),
            reply_to_id: None,
        }
    }

    /// Incoming text message from a user
    pub fn message(channel_id: &str, conversation_id: &str, user_id: &str, text: &str) -> Self {
        let mut activity = Self::base(ActivityType::Message, channel_id, conversation_id, user_id);
        activity.text = Some(text.to_string());
        activity
    }

    /// Incoming named event
    pub fn event(
        channel_id: &str,
        conversation_id: &str,
        user_id: &str,
        name: &str,
        value: Option<Value>,
    ) -> Self {
        let mut activity = Self::base(ActivityType::Event, channel_id, conversation_id, user_id);
        activity.name = Some(name.to_string());
        activity.value = value;
        activity
    }

    /// Membership change. Channels usually omit the sender on these.
    pub fn conversation_update(
        channel_id: &str,
        conversation_id: &str,
        members_added: Vec<ChannelAccount>,
    ) -> Self {
        let mut activity = Self::base(ActivityType::ConversationUpdate, channel_id, conversation_id, "");
        activity.from = None;
        activity.members_added = members_added;
        activity
    }

    /// Build a text reply addressed back to the sender of this activity
    pub fn reply_text(&self, text: &str) -> Activity {
        Activity {
            activity_type: ActivityType::Message,
            id: Some(uuid::Uuid::new_v4().to_string()),
            timestamp: Some(Utc::now()),
            channel_id: self.channel_id.clone(),
            from: self.recipient.clone(),
            recipient: self.from.clone(),
            conversation: self.conversation.clone(),
            text: Some(text.to_string()),
            name: None,
            value: None,
            members_added: Vec::new(),
            reply_to_id: self.id.clone(),
        }
    }

    pub fn is_message(&self) -> bool {
        self.activity_type == ActivityType::Message
    }

    pub fn is_event(&self) -> bool {
        self.activity_type == ActivityType::Event
    }

    /// Text of a message activity, if any
    pub fn message_text(&self) -> Option<&str> {
        if self.is_message() {
            self.text.as_deref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_wire_shape() {
        let activity = Activity::event("test", "conv-1", "user-1", "orderShipped", None);
        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["channelId"], "test");
        assert_eq!(json["name"], "orderShipped");
        assert!(json.get("membersAdded").is_none());
    }

    #[test]
    fn test_unknown_activity_type() {
        let activity: Activity =
            serde_json::from_str(r#"{"type":"installationUpdate","channelId":"x"}"#).unwrap();
        assert_eq!(activity.activity_type, ActivityType::Unknown);
        assert!(activity.message_text().is_none());
    }

    #[test]
    fn test_reply_swaps_accounts() {
        let mut incoming = Activity::message("test", "conv-1", "user-1", "hi");
        incoming.recipient = Some(ChannelAccount::new("bot"));
        let reply = incoming.reply_text("hello");
        assert_eq!(reply.from.unwrap().id, "bot");
        assert_eq!(reply.recipient.unwrap().id, "user-1");
        assert_eq!(reply.reply_to_id, incoming.id);
    }
}
