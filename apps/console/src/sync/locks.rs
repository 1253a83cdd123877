use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-chat mutual exclusion for reconciliation runs. Two overlapping runs on
/// the same chat would race on delete + rebuild; runs on different chats
/// proceed independently.
#[derive(Clone, Default)]
pub struct ConversationLocks {
    inner: Arc<DashMap<i32, Arc<Mutex<()>>>>,
}

/// Held for the duration of one run. Dropping it releases the chat and
/// forgets the lock once nobody else is waiting on it.
pub struct ConversationGuard {
    chat_id: i32,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<i32, Arc<Mutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, chat_id: i32) -> ConversationGuard {
        let mutex = Arc::clone(&self.inner.entry(chat_id).or_default());
        let guard = mutex.lock_owned().await;
        ConversationGuard {
            chat_id,
            guard: Some(guard),
            locks: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
impl ConversationLocks {
    /// Number of chats with a live or awaited lock.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.chat_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
