use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::chats::queries::{
    self, ChatMessage, ChatStats, ChatSummary, DEFAULT_CHAT_LIMIT,
};
use crate::errors::AppError;
use crate::models::chat::ChatRow;
use crate::state::AppState;
use crate::transcript::MessageOrder;

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct MessagesQuery {
    /// `asc` for oldest first; newest first otherwise.
    pub order: Option<String>,
}

#[derive(Deserialize)]
pub struct WaitingToggle {
    pub waiting: bool,
}

#[derive(Deserialize)]
pub struct AiToggle {
    pub ai: bool,
}

#[derive(Deserialize)]
pub struct TagRequest {
    pub tag: String,
}

#[derive(Serialize)]
pub struct TagsResponse {
    pub success: bool,
    pub tags: Vec<String>,
}

fn chat_not_found(chat_id: i32) -> AppError {
    AppError::NotFound(format!("Chat {chat_id} not found"))
}

/// GET /api/chats
pub async fn handle_list_chats(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<ChatSummary>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_CHAT_LIMIT);
    if limit <= 0 {
        return Err(AppError::Validation("limit must be positive".to_string()));
    }
    Ok(Json(queries::list_chats_with_last_message(&state.db, limit).await?))
}

/// GET /api/chats/:id
pub async fn handle_get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<i32>,
) -> Result<Json<ChatRow>, AppError> {
    let chat = state
        .sync
        .store
        .find_chat(chat_id)
        .await?
        .ok_or_else(|| chat_not_found(chat_id))?;
    Ok(Json(chat))
}

/// GET /api/chats-by-uuid/:uuid
pub async fn handle_get_chat_by_uuid(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<ChatRow>, AppError> {
    let chat = queries::get_chat_by_uuid(&state.db, &uuid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Chat with uuid {uuid} not found")))?;
    Ok(Json(chat))
}

/// GET /api/chats/:id/messages
///
/// Whole transcript, newest first unless `?order=asc`.
pub async fn handle_chat_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<i32>,
    Query(params): Query<MessagesQuery>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let order = match params.order.as_deref() {
        Some("asc") => MessageOrder::OldestFirst,
        None | Some("desc") => MessageOrder::NewestFirst,
        Some(other) => {
            return Err(AppError::Validation(format!(
                "order must be 'asc' or 'desc', got '{other}'"
            )))
        }
    };

    let store = &state.sync.store;
    if store.find_chat(chat_id).await?.is_none() {
        return Err(chat_not_found(chat_id));
    }
    let rows = store.list_messages(chat_id, order).await?;
    Ok(Json(rows.into_iter().map(ChatMessage::from).collect()))
}

/// PATCH /api/chats/:id/waiting
pub async fn handle_set_waiting(
    State(state): State<AppState>,
    Path(chat_id): Path<i32>,
    Json(req): Json<WaitingToggle>,
) -> Result<Json<ChatRow>, AppError> {
    let chat = queries::update_chat_waiting(&state.db, chat_id, req.waiting)
        .await?
        .ok_or_else(|| chat_not_found(chat_id))?;
    Ok(Json(chat))
}

/// PATCH /api/chats/:id/ai
pub async fn handle_set_ai(
    State(state): State<AppState>,
    Path(chat_id): Path<i32>,
    Json(req): Json<AiToggle>,
) -> Result<Json<ChatRow>, AppError> {
    let chat = queries::update_chat_ai(&state.db, chat_id, req.ai)
        .await?
        .ok_or_else(|| chat_not_found(chat_id))?;
    Ok(Json(chat))
}

/// POST /api/chats/:id/tags
pub async fn handle_add_tag(
    State(state): State<AppState>,
    Path(chat_id): Path<i32>,
    Json(req): Json<TagRequest>,
) -> Result<Json<TagsResponse>, AppError> {
    let tag = req.tag.trim();
    if tag.is_empty() {
        return Err(AppError::Validation("tag cannot be empty".to_string()));
    }
    let tags = queries::add_chat_tag(&state.db, chat_id, tag)
        .await?
        .ok_or_else(|| chat_not_found(chat_id))?;
    Ok(Json(TagsResponse {
        success: true,
        tags,
    }))
}

/// DELETE /api/chats/:id/tags/:tag
pub async fn handle_remove_tag(
    State(state): State<AppState>,
    Path((chat_id, tag)): Path<(i32, String)>,
) -> Result<Json<TagsResponse>, AppError> {
    let tags = queries::remove_chat_tag(&state.db, chat_id, &tag)
        .await?
        .ok_or_else(|| chat_not_found(chat_id))?;
    Ok(Json(TagsResponse {
        success: true,
        tags,
    }))
}

/// GET /api/stats
pub async fn handle_stats(State(state): State<AppState>) -> Result<Json<ChatStats>, AppError> {
    Ok(Json(queries::get_stats(&state.db).await?))
}
