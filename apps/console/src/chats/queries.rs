use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::models::chat::{ChatRow, MessageRow};

/// Default cap for the chat list.
pub const DEFAULT_CHAT_LIMIT: i64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastMessage {
    pub id: i32,
    pub content: String,
    pub message_type: String,
    pub ai: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: i32,
    pub uuid: String,
    pub ai: bool,
    pub waiting: bool,
    pub name: String,
    pub tags: Vec<String>,
    pub messager: String,
    pub last_message: Option<LastMessage>,
}

/// A transcript record as the console front end consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i32,
    pub content: String,
    pub message_type: String,
    pub ai: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub is_image: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatStats {
    pub total: i64,
    pub pending: i64,
    pub ai: i64,
}

#[derive(Debug, FromRow)]
struct ChatSummaryRow {
    id: i32,
    uuid: String,
    ai: bool,
    waiting: bool,
    name: String,
    tags: Vec<String>,
    messager: String,
    last_id: Option<i32>,
    last_content: Option<String>,
    last_type: Option<String>,
    last_ai: Option<bool>,
    last_at: Option<DateTime<Utc>>,
}

impl From<ChatSummaryRow> for ChatSummary {
    fn from(row: ChatSummaryRow) -> Self {
        let last_message = match (row.last_id, row.last_content, row.last_type, row.last_at) {
            (Some(id), Some(content), Some(message_type), Some(timestamp)) => Some(LastMessage {
                id,
                content,
                message_type,
                ai: row.last_ai.unwrap_or(false),
                timestamp,
            }),
            _ => None,
        };
        ChatSummary {
            id: row.id,
            uuid: row.uuid,
            ai: row.ai,
            waiting: row.waiting,
            name: row.name,
            tags: row.tags,
            messager: row.messager,
            last_message,
        }
    }
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        ChatMessage {
            id: row.id,
            content: row.message,
            message_type: row.message_type,
            ai: row.ai,
            timestamp: row.created_at,
            chat_id: row.chat_id.to_string(),
            is_image: row.is_image,
        }
    }
}

/// Chats newest first, each with its latest message (by id).
pub async fn list_chats_with_last_message(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<ChatSummary>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ChatSummaryRow>(
        r#"
        SELECT c.id, c.uuid, c.ai, c.waiting, c.name, c.tags, c.messager,
               m.id AS last_id, m.message AS last_content, m.message_type AS last_type,
               m.ai AS last_ai, m.created_at AS last_at
        FROM chats c
        LEFT JOIN LATERAL (
            SELECT id, message, message_type, ai, created_at
            FROM messages
            WHERE chat_id = c.id
            ORDER BY id DESC
            LIMIT 1
        ) m ON TRUE
        ORDER BY c.id DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ChatSummary::from).collect())
}

pub async fn get_chat_by_uuid(pool: &PgPool, uuid: &str) -> Result<Option<ChatRow>, sqlx::Error> {
    sqlx::query_as::<_, ChatRow>("SELECT * FROM chats WHERE uuid = $1")
        .bind(uuid)
        .fetch_optional(pool)
        .await
}

pub async fn update_chat_waiting(
    pool: &PgPool,
    chat_id: i32,
    waiting: bool,
) -> Result<Option<ChatRow>, sqlx::Error> {
    sqlx::query_as::<_, ChatRow>("UPDATE chats SET waiting = $2 WHERE id = $1 RETURNING *")
        .bind(chat_id)
        .bind(waiting)
        .fetch_optional(pool)
        .await
}

pub async fn update_chat_ai(
    pool: &PgPool,
    chat_id: i32,
    ai: bool,
) -> Result<Option<ChatRow>, sqlx::Error> {
    sqlx::query_as::<_, ChatRow>("UPDATE chats SET ai = $2 WHERE id = $1 RETURNING *")
        .bind(chat_id)
        .bind(ai)
        .fetch_optional(pool)
        .await
}

/// Adds `tag` unless present. Returns the resulting tag set, or `None` if
/// the chat does not exist.
pub async fn add_chat_tag(
    pool: &PgPool,
    chat_id: i32,
    tag: &str,
) -> Result<Option<Vec<String>>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        UPDATE chats
        SET tags = CASE WHEN $2 = ANY(tags) THEN tags ELSE array_append(tags, $2) END
        WHERE id = $1
        RETURNING tags
        "#,
    )
    .bind(chat_id)
    .bind(tag)
    .fetch_optional(pool)
    .await
}

pub async fn remove_chat_tag(
    pool: &PgPool,
    chat_id: i32,
    tag: &str,
) -> Result<Option<Vec<String>>, sqlx::Error> {
    sqlx::query_scalar("UPDATE chats SET tags = array_remove(tags, $2) WHERE id = $1 RETURNING tags")
        .bind(chat_id)
        .bind(tag)
        .fetch_optional(pool)
        .await
}

pub async fn get_stats(pool: &PgPool) -> Result<ChatStats, sqlx::Error> {
    let (total, pending, ai): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(id),
               COUNT(id) FILTER (WHERE waiting),
               COUNT(id) FILTER (WHERE ai)
        FROM chats
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(ChatStats { total, pending, ai })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary_row(with_message: bool) -> ChatSummaryRow {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        ChatSummaryRow {
            id: 3,
            uuid: "12345".to_string(),
            ai: true,
            waiting: false,
            name: "Anna".to_string(),
            tags: vec!["vip".to_string()],
            messager: "vk".to_string(),
            last_id: with_message.then_some(40),
            last_content: with_message.then(|| "see you".to_string()),
            last_type: with_message.then(|| "answer".to_string()),
            last_ai: with_message.then_some(true),
            last_at: with_message.then_some(at),
        }
    }

    #[test]
    fn test_summary_without_messages() {
        let summary = ChatSummary::from(summary_row(false));
        assert!(summary.last_message.is_none());
        assert_eq!(serde_json::to_value(&summary).unwrap()["last_message"], json!(null));
    }

    #[test]
    fn test_summary_with_last_message() {
        let summary = ChatSummary::from(summary_row(true));
        let last = summary.last_message.unwrap();
        assert_eq!(last.id, 40);
        assert_eq!(last.content, "see you");
        assert!(last.ai);
    }

    #[test]
    fn test_chat_message_shape() {
        let row = MessageRow {
            id: 9,
            chat_id: 3,
            message: "http://localhost:9000/psih-photo/1-2.jpg".to_string(),
            message_type: "question".to_string(),
            ai: false,
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            is_image: true,
        };
        let value = serde_json::to_value(ChatMessage::from(row)).unwrap();
        assert_eq!(value["chatId"], json!("3"));
        assert_eq!(value["content"], json!("http://localhost:9000/psih-photo/1-2.jpg"));
        assert_eq!(value["is_image"], json!(true));
        assert_eq!(value["timestamp"], json!("2023-11-14T22:13:20Z"));
    }
}
