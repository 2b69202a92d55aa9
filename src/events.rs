use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::WidgetResult;

/// Role of a message in the conversation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Individual conversation entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub id: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
            id: Uuid::new_v4().to_string(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// State-change notifications published by a conversation.
///
/// Subscribers render from these instead of the conversation reaching into
/// the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    /// A new entry was appended at the tail.
    Appended(Message),
    /// An empty assistant entry was appended and will be filled by updates.
    Started(Message),
    /// The in-progress tail was replaced with a fuller snapshot.
    Updated { id: String, content: String },
    /// The in-progress tail will not change any more.
    Finalized(Message),
    /// All entries were discarded.
    Cleared,
    /// Thread identity became known.
    ThreadIdentified(String),
    /// The widget started or stopped processing a submission.
    Processing(bool),
}

/// Commands accepted by a spawned widget task
#[derive(Debug)]
pub enum WidgetCommand {
    /// Submit user text through the pipeline
    Submit(String),
    /// Clear the conversation and start over
    Reset,
    /// Request the current conversation
    Snapshot(oneshot::Sender<Vec<Message>>),
    /// Request the resolved thread identity
    ThreadId(oneshot::Sender<Option<String>>),
    /// Read the latest assistant message aloud
    SpeakLast(oneshot::Sender<WidgetResult<()>>),
    /// Stop accepting commands
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn roles_round_trip_through_strings() {
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!(Role::from_str("system").unwrap(), Role::System);
        assert_eq!(
            serde_json::to_string(&Role::User).unwrap(),
            "\"user\""
        );
    }

    #[test]
    fn messages_get_unique_ids_and_timestamps() {
        let a = Message::user("hi");
        let b = Message::user("hi");
        assert_ne!(a.id, b.id);
        assert!(a.timestamp > 0);
        assert_eq!(a.role, Role::User);
    }
}
