use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current embedded-message schema. Version 1 documents predate message ids
/// and favorite flags; `migrations::backfill_messages` upgrades them at
/// startup.
pub const CONVERSATION_SCHEMA_VERSION: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Message embedded in a conversation document.
///
/// Immutable after the append except for `is_favorite`; ordinal position in
/// the array never changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub role: MessageRole,
    pub text: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_favorite: bool,
}

impl StoredMessage {
    fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            created_at: Utc::now(),
            is_favorite: false,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub history_id: ObjectId,
    pub title: String,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub last_updated: DateTime<Utc>,
    #[serde(default = "legacy_schema_version")]
    pub schema_version: i32,
}

fn legacy_schema_version() -> i32 {
    1
}

impl Conversation {
    /// First user message, truncated to 100 chars, for list views.
    pub fn preview(&self) -> Option<String> {
        let text = &self
            .messages
            .iter()
            .find(|m| m.role == MessageRole::User)?
            .text;

        if text.chars().count() > 100 {
            Some(format!("{}...", text.chars().take(100).collect::<String>()))
        } else {
            Some(text.clone())
        }
    }
}
