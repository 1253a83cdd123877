use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Platform tag stored in `chats.messager` for VK conversations.
pub const VK_PLATFORM: &str = "vk";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatRow {
    pub id: i32,
    /// External peer identifier; a numeric peer id for VK chats.
    pub uuid: String,
    pub ai: bool,
    pub waiting: bool,
    pub tags: Vec<String>,
    pub name: String,
    pub messager: String,
}

impl ChatRow {
    pub fn is_vk(&self) -> bool {
        self.messager == VK_PLATFORM
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MessageRow {
    pub id: i32,
    pub chat_id: i32,
    /// Text body, or a URL when `is_image` is set.
    pub message: String,
    pub message_type: String,
    pub ai: bool,
    pub created_at: DateTime<Utc>,
    pub is_image: bool,
}

/// Who authored a transcript record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// From the end user.
    Question,
    /// From an operator, the AI, or the community itself.
    Answer,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::Question => "question",
            MessageRole::Answer => "answer",
        }
    }
}

/// A transcript record that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub chat_id: i32,
    pub body: String,
    pub role: MessageRole,
    pub ai: bool,
    pub created_at: DateTime<Utc>,
    pub is_image: bool,
}
