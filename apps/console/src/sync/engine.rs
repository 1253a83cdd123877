//! VK transcript reconciliation.
//!
//! Flow: lock chat → lookup → fetch full VK history → compare record counts →
//!       (on mismatch) materialize records, re-hosting photos → replace the
//!       transcript in one transaction.
//!
//! Counts are the only sync signal. Two different histories of equal size
//! are treated as synchronized.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::media::storage::{content_type_for, file_extension};
use crate::media::{object_name, MediaError, MediaFetcher, ObjectStore, UploadError};
use crate::models::chat::NewMessage;
use crate::sync::locks::ConversationLocks;
use crate::sync::report::{SyncError, SyncOutcome, SyncPhase, SyncReport};
use crate::transcript::TranscriptStore;
use crate::vk::{relevant_items, HistoryItem, HistorySource};

/// Everything a reconciliation run talks to, built once at startup.
#[derive(Clone)]
pub struct SyncContext {
    pub store: Arc<dyn TranscriptStore>,
    /// `None` when no VK token is configured.
    pub history: Option<Arc<dyn HistorySource>>,
    pub media: Arc<dyn MediaFetcher>,
    /// `None` when object storage is not configured; photos then keep their VK URL.
    pub uploader: Option<Arc<dyn ObjectStore>>,
    pub group_id: i64,
    pub locks: ConversationLocks,
}

/// Why a photo could not be re-hosted.
#[derive(Debug, thiserror::Error)]
enum RehostError {
    #[error("download failed: {0}")]
    Fetch(#[from] MediaError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// Reconciles one chat's transcript with its VK history and reports the result.
pub async fn sync_vk(ctx: &SyncContext, chat_id: i32) -> SyncReport {
    let run_id = Uuid::new_v4();
    let span = info_span!("sync_vk", chat_id, %run_id);

    let result = reconcile(ctx, chat_id).instrument(span.clone()).await;

    span.in_scope(|| match &result {
        Ok(SyncOutcome::AlreadySynced { remote_count, .. }) => {
            info!(remote_count, "Transcript already synchronized");
        }
        Ok(SyncOutcome::Rebuilt {
            remote_count,
            local_count_before,
            media_fallbacks,
            ..
        }) => {
            info!(
                remote_count,
                local_count_before, media_fallbacks, "Transcript rebuilt from VK history"
            );
        }
        Err(e) => warn!(phase = ?e.phase(), "Reconciliation failed: {e}"),
    });

    SyncReport::from(result)
}

/// Runs the four phases under the chat's lock.
pub async fn reconcile(ctx: &SyncContext, chat_id: i32) -> Result<SyncOutcome, SyncError> {
    let _guard = ctx.locks.acquire(chat_id).await;

    // Lookup
    let chat = ctx
        .store
        .find_chat(chat_id)
        .await
        .map_err(|source| SyncError::Persistence {
            phase: SyncPhase::Lookup,
            source,
        })?
        .ok_or(SyncError::NotFound)?;
    if !chat.is_vk() {
        return Err(SyncError::WrongPlatform);
    }
    let history = ctx.history.as_ref().ok_or(SyncError::MissingCredential)?;
    let peer_id: i64 = chat
        .uuid
        .trim()
        .parse()
        .map_err(|_| SyncError::InvalidPeerId(chat.uuid.clone()))?;

    // Fetch
    let raw = history
        .fetch_history(peer_id)
        .await
        .map_err(SyncError::RemoteFetch)?;
    let items = relevant_items(raw);
    let remote_count = items.iter().map(HistoryItem::record_count).sum::<usize>() as i64;

    // Compare
    let local_count = ctx
        .store
        .count_messages(chat_id)
        .await
        .map_err(|source| SyncError::Persistence {
            phase: SyncPhase::Compare,
            source,
        })?;
    if remote_count == local_count {
        return Ok(SyncOutcome::AlreadySynced {
            remote_count,
            local_count,
        });
    }

    // Rebuild
    info!(remote_count, local_count, "Counts differ, rebuilding transcript");
    let (records, media_fallbacks) = materialize(ctx, chat_id, peer_id, &items).await;
    let inserted = ctx
        .store
        .replace_messages(chat_id, &records)
        .await
        .map_err(|source| SyncError::Persistence {
            phase: SyncPhase::Rebuild,
            source,
        })?;

    Ok(SyncOutcome::Rebuilt {
        remote_count,
        local_count_before: local_count,
        local_count_after: inserted as i64,
        media_fallbacks,
    })
}

/// Turns sorted history items into transcript records. Returns the records
/// and how many photos fell back to their VK URL.
async fn materialize(
    ctx: &SyncContext,
    chat_id: i32,
    peer_id: i64,
    items: &[HistoryItem],
) -> (Vec<NewMessage>, usize) {
    let mut records = Vec::with_capacity(items.len());
    let mut media_fallbacks = 0;
    // Photos already named per timestamp, across items of this run.
    let mut photos_per_stamp: HashMap<i64, usize> = HashMap::new();

    for item in items {
        let role = item.role(ctx.group_id);
        let (created_at, stamp) = item_time(item.date);

        if let Some(text) = item.text() {
            records.push(NewMessage {
                chat_id,
                body: text.to_string(),
                role,
                ai: false,
                created_at,
                is_image: false,
            });
        }

        for url in item.photo_urls() {
            let seen = photos_per_stamp.entry(stamp).or_default();
            let index = *seen;
            *seen += 1;

            let body = match &ctx.uploader {
                None => url.to_string(),
                Some(uploader) => {
                    match rehost_photo(ctx.media.as_ref(), uploader.as_ref(), peer_id, stamp, url, index)
                        .await
                    {
                        Ok(hosted) => hosted,
                        Err(e) => {
                            warn!(peer_id, item_id = item.id, url, "Keeping VK photo URL: {e}");
                            media_fallbacks += 1;
                            url.to_string()
                        }
                    }
                }
            };
            records.push(NewMessage {
                chat_id,
                body,
                role,
                ai: false,
                created_at,
                is_image: true,
            });
        }
    }

    (records, media_fallbacks)
}

async fn rehost_photo(
    media: &dyn MediaFetcher,
    uploader: &dyn ObjectStore,
    peer_id: i64,
    stamp: i64,
    url: &str,
    index: usize,
) -> Result<String, RehostError> {
    let body = media.fetch(url).await?;
    let name = object_name(peer_id, stamp, url, index);
    let content_type = content_type_for(&file_extension(url));
    Ok(uploader.put(&name, body, content_type).await?)
}

/// VK omits `date` on some service items; those are stamped with the current time.
fn item_time(date: i64) -> (DateTime<Utc>, i64) {
    if date > 0 {
        if let Some(at) = DateTime::from_timestamp(date, 0) {
            return (at, date);
        }
    }
    let now = Utc::now();
    (now, now.timestamp())
}
