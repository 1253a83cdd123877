//! In-memory collaborators for reconciliation tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::media::{MediaError, MediaFetcher, ObjectStore, UploadError};
use crate::models::chat::{ChatRow, MessageRow, NewMessage};
use crate::transcript::{MessageOrder, StoreError, TranscriptStore};
use crate::vk::types::{Attachment, Photo};
use crate::vk::{HistoryError, HistoryItem, HistorySource};

pub fn text_item(from_id: i64, date: i64, text: &str) -> HistoryItem {
    HistoryItem {
        id: date,
        from_id,
        date,
        text: Some(text.to_string()),
        attachments: vec![],
    }
}

pub fn photo_item(from_id: i64, date: i64, url: &str) -> HistoryItem {
    HistoryItem {
        id: date,
        from_id,
        date,
        text: None,
        attachments: vec![Attachment {
            kind: "photo".to_string(),
            photo: Some(Photo {
                photo_604: Some(url.to_string()),
                ..Default::default()
            }),
        }],
    }
}

#[derive(Default)]
struct StoreState {
    chats: Vec<ChatRow>,
    messages: Vec<MessageRow>,
    next_id: i32,
    fail_insert_at: Option<usize>,
}

/// Transcript store whose `replace_messages` works on a copy and only swaps
/// it in at the end, so an injected insert failure leaves nothing behind.
#[derive(Default)]
pub struct MemoryTranscriptStore {
    state: Mutex<StoreState>,
    replace_calls: AtomicUsize,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chat(&self, id: i32, uuid: &str, messager: &str) {
        self.state.lock().unwrap().chats.push(ChatRow {
            id,
            uuid: uuid.to_string(),
            ai: false,
            waiting: false,
            tags: vec![],
            name: "Test".to_string(),
            messager: messager.to_string(),
        });
    }

    /// Adds `n` stale text records to the chat.
    pub fn seed_messages(&self, chat_id: i32, n: usize) {
        let mut state = self.state.lock().unwrap();
        for i in 0..n {
            state.next_id += 1;
            let id = state.next_id;
            state.messages.push(MessageRow {
                id,
                chat_id,
                message: format!("stale {i}"),
                message_type: "question".to_string(),
                ai: false,
                created_at: DateTime::from_timestamp(1_600_000_000 + i as i64, 0)
                    .unwrap_or_else(Utc::now),
                is_image: false,
            });
        }
    }

    /// The next `replace_messages` fails when it reaches the record at `index`.
    pub fn fail_insert_at(&self, index: usize) {
        self.state.lock().unwrap().fail_insert_at = Some(index);
    }

    pub fn replace_calls(&self) -> usize {
        self.replace_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn find_chat(&self, chat_id: i32) -> Result<Option<ChatRow>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.chats.iter().find(|c| c.id == chat_id).cloned())
    }

    async fn count_messages(&self, chat_id: i32) -> Result<i64, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.messages.iter().filter(|m| m.chat_id == chat_id).count() as i64)
    }

    async fn list_messages(
        &self,
        chat_id: i32,
        order: MessageOrder,
    ) -> Result<Vec<MessageRow>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<MessageRow> = state
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| (m.created_at, m.id));
        if order == MessageOrder::NewestFirst {
            rows.reverse();
        }
        Ok(rows)
    }

    async fn replace_messages(
        &self,
        chat_id: i32,
        records: &[NewMessage],
    ) -> Result<u64, StoreError> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let fail_at = state.fail_insert_at.take();

        let mut working: Vec<MessageRow> = state
            .messages
            .iter()
            .filter(|m| m.chat_id != chat_id)
            .cloned()
            .collect();
        let mut next_id = state.next_id;
        for (index, record) in records.iter().enumerate() {
            if fail_at == Some(index) {
                return Err(StoreError::Database(sqlx::Error::Protocol(
                    "simulated insert failure".to_string(),
                )));
            }
            next_id += 1;
            working.push(MessageRow {
                id: next_id,
                chat_id: record.chat_id,
                message: record.body.clone(),
                message_type: record.role.as_str().to_string(),
                ai: record.ai,
                created_at: record.created_at,
                is_image: record.is_image,
            });
        }

        state.messages = working;
        state.next_id = next_id;
        Ok(records.len() as u64)
    }
}

/// History source returning a fixed item list, optionally after a delay or
/// with a one-shot failure.
pub struct ScriptedHistory {
    items: Vec<HistoryItem>,
    failure: Mutex<Option<HistoryError>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl ScriptedHistory {
    pub fn new(items: Vec<HistoryItem>) -> Self {
        Self {
            items,
            failure: Mutex::new(None),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_with(&self, error: HistoryError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistorySource for ScriptedHistory {
    async fn fetch_history(&self, _peer_id: i64) -> Result<Vec<HistoryItem>, HistoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failure.lock().unwrap().take();
        match failure {
            Some(error) => Err(error),
            None => Ok(self.items.clone()),
        }
    }
}

pub struct FakeMedia {
    fail: bool,
    calls: AtomicUsize,
}

impl FakeMedia {
    pub fn ok() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaFetcher for FakeMedia {
    async fn fetch(&self, _url: &str) -> Result<Bytes, MediaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(MediaError::Status(404))
        } else {
            Ok(Bytes::from_static(b"\xFF\xD8\xFFjpeg"))
        }
    }
}

pub struct FakeObjectStore {
    base_url: Option<String>,
    puts: Mutex<Vec<(String, String)>>,
}

impl FakeObjectStore {
    pub fn ok(base_url: &str) -> Self {
        Self {
            base_url: Some(base_url.to_string()),
            puts: Mutex::new(vec![]),
        }
    }

    pub fn failing() -> Self {
        Self {
            base_url: None,
            puts: Mutex::new(vec![]),
        }
    }

    /// Names of successfully stored objects.
    pub fn names(&self) -> Vec<String> {
        self.puts.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn content_types(&self) -> Vec<String> {
        self.puts.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn put(&self, name: &str, _body: Bytes, content_type: &str) -> Result<String, UploadError> {
        match &self.base_url {
            Some(base) => {
                self.puts
                    .lock()
                    .unwrap()
                    .push((name.to_string(), content_type.to_string()));
                Ok(format!("{base}/{name}"))
            }
            None => Err(UploadError::Put("bucket unavailable".to_string())),
        }
    }
}
