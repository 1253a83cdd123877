use axum::{
    extract::{Path, State},
    Json,
};

use crate::state::AppState;
use crate::sync::{sync_vk, SyncReport};

/// POST /api/chats/:id/sync-vk
///
/// Always answers 200; failures are reported inside the body.
pub async fn handle_sync_vk(
    State(state): State<AppState>,
    Path(chat_id): Path<i32>,
) -> Json<SyncReport> {
    Json(sync_vk(&state.sync, chat_id).await)
}
