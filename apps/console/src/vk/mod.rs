/// VK client. Reads a conversation's full message history page by page.
///
/// Throttling (HTTP 429, VK flood codes) and 5xx answers are retried with
/// exponential backoff. Anything else, including a timeout on the final
/// attempt, fails the whole read: a partial history must never reach the
/// reconciliation count.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

pub mod types;

use types::{HistoryPage, VkEnvelope};
pub use types::{relevant_items, HistoryItem};

/// VK caps `messages.getHistory` at 200 items per call.
pub const PAGE_SIZE: usize = 200;
const MAX_RETRIES: u32 = 3;

/// VK error codes worth retrying: too many requests, flood control, internal error.
const RETRYABLE_VK_CODES: [i64; 3] = [6, 9, 10];

#[derive(Debug, Error)]
pub enum HistoryError {
    /// Built with the request URL stripped: it carries the access token.
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("VK API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },
}

/// Source of a conversation's raw remote history.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Returns every history item for `peer_id`, in whatever order the
    /// platform hands them out.
    async fn fetch_history(&self, peer_id: i64) -> Result<Vec<HistoryItem>, HistoryError>;
}

#[derive(Clone)]
pub struct VkClient {
    client: Client,
    token: String,
    base_url: String,
    api_version: String,
    backoff_base: Duration,
}

impl VkClient {
    pub fn new(token: String, base_url: String, api_version: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_version,
            backoff_base: Duration::from_millis(1000),
        }
    }

    #[cfg(test)]
    fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Fetches one page, retrying transient failures.
    async fn get_page(&self, peer_id: i64, offset: usize) -> Result<Vec<HistoryItem>, HistoryError> {
        let url = format!("{}/messages.getHistory", self.base_url);
        let mut last_error: Option<HistoryError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: base, 2*base
                let delay = self.backoff_base * (1 << (attempt - 1));
                warn!(
                    peer_id,
                    offset,
                    "VK history call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .get(&url)
                .query(&[
                    ("peer_id", peer_id.to_string()),
                    ("count", PAGE_SIZE.to_string()),
                    ("offset", offset.to_string()),
                    ("access_token", self.token.clone()),
                    ("v", self.api_version.clone()),
                ])
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(HistoryError::Http(e.without_url()));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("VK API returned {}: {}", status, body);
                last_error = Some(HistoryError::Status {
                    status: status.as_u16(),
                    body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(HistoryError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let envelope = response
                .json::<VkEnvelope<HistoryPage>>()
                .await
                .map_err(|e| HistoryError::Http(e.without_url()))?;
            match envelope {
                VkEnvelope::Ok { response } => return Ok(response.items),
                VkEnvelope::Err { error } if RETRYABLE_VK_CODES.contains(&error.error_code) => {
                    warn!("VK API throttled ({}): {}", error.error_code, error.error_msg);
                    last_error = Some(HistoryError::Api {
                        code: error.error_code,
                        message: error.error_msg,
                    });
                }
                VkEnvelope::Err { error } => {
                    return Err(HistoryError::Api {
                        code: error.error_code,
                        message: error.error_msg,
                    })
                }
            }
        }

        Err(last_error.unwrap_or(HistoryError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl HistorySource for VkClient {
    async fn fetch_history(&self, peer_id: i64) -> Result<Vec<HistoryItem>, HistoryError> {
        let mut all_items = Vec::new();
        let mut offset = 0;

        loop {
            let items = self.get_page(peer_id, offset).await?;
            let page_len = items.len();
            all_items.extend(items);

            // A short (or empty) page is the last one
            if page_len < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        debug!(peer_id, "Fetched {} VK history items", all_items.len());
        Ok(all_items)
    }
}
