//! Transcript storage — the ordered record of messages per chat.
//!
//! Every write the reconciliation engine performs goes through
//! [`TranscriptStore::replace_messages`], which deletes and re-appends inside
//! one transaction. Readers see either the old transcript or the new one.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::chat::{ChatRow, MessageRow, NewMessage};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Chat {0} not found")]
    ChatNotFound(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrder {
    OldestFirst,
    NewestFirst,
}

#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn find_chat(&self, chat_id: i32) -> Result<Option<ChatRow>, StoreError>;

    async fn count_messages(&self, chat_id: i32) -> Result<i64, StoreError>;

    async fn list_messages(
        &self,
        chat_id: i32,
        order: MessageOrder,
    ) -> Result<Vec<MessageRow>, StoreError>;

    /// Atomically replaces the chat's whole transcript with `records`, in
    /// the given order. On error nothing changes.
    async fn replace_messages(&self, chat_id: i32, records: &[NewMessage])
        -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct PgTranscriptStore {
    pool: PgPool,
}

impl PgTranscriptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TranscriptStore for PgTranscriptStore {
    async fn find_chat(&self, chat_id: i32) -> Result<Option<ChatRow>, StoreError> {
        Ok(
            sqlx::query_as::<_, ChatRow>("SELECT * FROM chats WHERE id = $1")
                .bind(chat_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn count_messages(&self, chat_id: i32) -> Result<i64, StoreError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(id) FROM messages WHERE chat_id = $1")
                .bind(chat_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn list_messages(
        &self,
        chat_id: i32,
        order: MessageOrder,
    ) -> Result<Vec<MessageRow>, StoreError> {
        let sql = match order {
            MessageOrder::OldestFirst => {
                "SELECT * FROM messages WHERE chat_id = $1 ORDER BY created_at ASC, id ASC"
            }
            MessageOrder::NewestFirst => {
                "SELECT * FROM messages WHERE chat_id = $1 ORDER BY created_at DESC, id DESC"
            }
        };
        Ok(sqlx::query_as::<_, MessageRow>(sql)
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn replace_messages(
        &self,
        chat_id: i32,
        records: &[NewMessage],
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        match rebuild_in(&mut tx, chat_id, records).await {
            Ok((deleted, inserted)) => {
                tx.commit().await?;
                info!(chat_id, deleted, inserted, "Transcript replaced");
                Ok(inserted)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(chat_id, "Transcript rollback failed: {rollback_err}");
                }
                Err(e)
            }
        }
    }
}

async fn rebuild_in(
    tx: &mut Transaction<'_, Postgres>,
    chat_id: i32,
    records: &[NewMessage],
) -> Result<(u64, u64), StoreError> {
    // Row lock serializes rebuilds of the same chat across processes
    let locked: Option<i32> = sqlx::query_scalar("SELECT id FROM chats WHERE id = $1 FOR UPDATE")
        .bind(chat_id)
        .fetch_optional(&mut **tx)
        .await?;
    if locked.is_none() {
        return Err(StoreError::ChatNotFound(chat_id));
    }

    let deleted = delete_all_in(tx, chat_id).await?;
    let mut inserted = 0;
    for record in records {
        append_in(tx, record).await?;
        inserted += 1;
    }
    Ok((deleted, inserted))
}

async fn delete_all_in(
    tx: &mut Transaction<'_, Postgres>,
    chat_id: i32,
) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM messages WHERE chat_id = $1")
        .bind(chat_id)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

async fn append_in(
    tx: &mut Transaction<'_, Postgres>,
    record: &NewMessage,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO messages (chat_id, message, message_type, ai, created_at, is_image)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(record.chat_id)
    .bind(&record.body)
    .bind(record.role.as_str())
    .bind(record.ai)
    .bind(record.created_at)
    .bind(record.is_image)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
