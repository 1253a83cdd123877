use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transcript::StoreError;
use crate::vk::HistoryError;

/// The four steps of a reconciliation run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Lookup,
    Fetch,
    Compare,
    Rebuild,
}

/// Why a run stopped. None of these leave the transcript changed.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Chat not found")]
    NotFound,

    #[error("Chat is not a VK chat")]
    WrongPlatform,

    #[error("VK_TOKEN not found")]
    MissingCredential,

    #[error("Chat uuid '{0}' is not a VK peer id")]
    InvalidPeerId(String),

    #[error("Failed to fetch VK history: {0}")]
    RemoteFetch(#[source] HistoryError),

    #[error("Error during synchronization: {source}")]
    Persistence {
        phase: SyncPhase,
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    pub fn phase(&self) -> SyncPhase {
        match self {
            SyncError::NotFound
            | SyncError::WrongPlatform
            | SyncError::MissingCredential
            | SyncError::InvalidPeerId(_) => SyncPhase::Lookup,
            SyncError::RemoteFetch(_) => SyncPhase::Fetch,
            SyncError::Persistence { phase, .. } => *phase,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Counts matched; nothing was written.
    AlreadySynced { remote_count: i64, local_count: i64 },
    Rebuilt {
        remote_count: i64,
        local_count_before: i64,
        local_count_after: i64,
        /// Photos stored under their original VK URL because re-hosting failed.
        media_fallbacks: usize,
    },
}

/// JSON result handed to API callers. Failures are reported here, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vk_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_count_before: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_count_after: Option<i64>,
}

impl From<Result<SyncOutcome, SyncError>> for SyncReport {
    fn from(result: Result<SyncOutcome, SyncError>) -> Self {
        match result {
            Ok(SyncOutcome::AlreadySynced {
                remote_count,
                local_count,
            }) => SyncReport {
                success: true,
                message: "Messages are already synchronized".to_string(),
                vk_count: Some(remote_count),
                db_count: Some(local_count),
                db_count_before: None,
                db_count_after: None,
            },
            Ok(SyncOutcome::Rebuilt {
                remote_count,
                local_count_before,
                local_count_after,
                ..
            }) => SyncReport {
                success: true,
                message: "Messages synchronized successfully".to_string(),
                vk_count: Some(remote_count),
                db_count: Some(local_count_before),
                db_count_before: Some(local_count_before),
                db_count_after: Some(local_count_after),
            },
            Err(e) => SyncReport {
                success: false,
                message: e.to_string(),
                vk_count: None,
                db_count: None,
                db_count_before: None,
                db_count_after: None,
            },
        }
    }
}
