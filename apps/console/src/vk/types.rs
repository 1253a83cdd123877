//! Wire types for `messages.getHistory` and the rules that decide which
//! history items matter for a transcript.

use serde::Deserialize;

use crate::models::chat::MessageRole;

/// Fixed photo size keys, best quality first.
const PHOTO_SIZE_KEYS: [&str; 5] = ["photo_1280", "photo_807", "photo_604", "photo_130", "photo_75"];

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum VkEnvelope<T> {
    Ok { response: T },
    Err { error: VkApiError },
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct VkApiError {
    pub error_code: i64,
    #[serde(default)]
    pub error_msg: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HistoryPage {
    #[serde(default)]
    pub items: Vec<HistoryItem>,
}

/// One raw message from a VK conversation history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryItem {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub from_id: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Unix seconds; 0 when VK omitted it.
    #[serde(default)]
    pub date: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub photo: Option<Photo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Photo {
    #[serde(default)]
    pub photo_1280: Option<String>,
    #[serde(default)]
    pub photo_807: Option<String>,
    #[serde(default)]
    pub photo_604: Option<String>,
    #[serde(default)]
    pub photo_130: Option<String>,
    #[serde(default)]
    pub photo_75: Option<String>,
    #[serde(default)]
    pub sizes: Vec<PhotoSize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhotoSize {
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub url: Option<String>,
}

impl HistoryItem {
    /// Non-empty text, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }

    pub fn has_photo(&self) -> bool {
        self.attachments.iter().any(Attachment::is_photo)
    }

    /// An item is relevant when it carries text or at least one photo.
    /// Stickers, voice messages, reposts and the like are dropped.
    pub fn is_relevant(&self) -> bool {
        self.text().is_some() || self.has_photo()
    }

    /// Negative sender ids are communities; the configured group id is ours too.
    pub fn role(&self, group_id: i64) -> MessageRole {
        if self.from_id < 0 || self.from_id == group_id {
            MessageRole::Answer
        } else {
            MessageRole::Question
        }
    }

    /// Best-quality URL of each photo attachment that has one, in attachment order.
    pub fn photo_urls(&self) -> Vec<&str> {
        self.attachments
            .iter()
            .filter(|a| a.is_photo())
            .filter_map(|a| a.photo.as_ref().and_then(Photo::best_url))
            .collect()
    }

    /// Number of transcript records this item turns into.
    pub fn record_count(&self) -> usize {
        usize::from(self.text().is_some()) + self.photo_urls().len()
    }
}

impl Attachment {
    pub fn is_photo(&self) -> bool {
        self.kind == "photo"
    }
}

impl Photo {
    fn fixed_size(&self, key: &str) -> Option<&str> {
        let url = match key {
            "photo_1280" => self.photo_1280.as_deref(),
            "photo_807" => self.photo_807.as_deref(),
            "photo_604" => self.photo_604.as_deref(),
            "photo_130" => self.photo_130.as_deref(),
            "photo_75" => self.photo_75.as_deref(),
            _ => None,
        };
        url.filter(|u| !u.is_empty())
    }

    /// Resolves a single URL: the fixed size keys win in priority order,
    /// otherwise the tallest entry of `sizes` (first one on ties).
    pub fn best_url(&self) -> Option<&str> {
        if let Some(url) = PHOTO_SIZE_KEYS.iter().find_map(|key| self.fixed_size(key)) {
            return Some(url);
        }
        self.sizes
            .iter()
            .rev()
            .max_by_key(|s| s.height)
            .and_then(|s| s.url.as_deref())
            .filter(|u| !u.is_empty())
    }
}

/// Keeps relevant items only, sorted oldest first. The sort is stable so
/// items sharing a timestamp keep their fetched order. Undated items are
/// stamped with the sync time, so they sort last.
pub fn relevant_items(items: Vec<HistoryItem>) -> Vec<HistoryItem> {
    let mut relevant: Vec<HistoryItem> = items.into_iter().filter(HistoryItem::is_relevant).collect();
    relevant.sort_by_key(|item| if item.date > 0 { item.date } else { i64::MAX });
    relevant
}
