// VK transcript reconciliation: converges a chat's stored transcript with
// its VK message history.

pub mod engine;
pub mod handlers;
pub mod locks;
pub mod report;

#[cfg(test)]
pub mod testing;

pub use engine::{sync_vk, SyncContext};
pub use locks::ConversationLocks;
pub use report::SyncReport;
