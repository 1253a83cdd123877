use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use thiserror::Error;
use tracing::info;

const DEFAULT_EXTENSION: &str = ".jpg";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("S3 upload failed: {0}")]
    Put(String),
}

/// Durable blob storage that hands back a stable retrieval URL.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, name: &str, body: Bytes, content_type: &str) -> Result<String, UploadError>;
}

/// MinIO / S3 bucket whose objects are publicly readable under `public_base_url`.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn public_url(&self, name: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, self.bucket, name)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, name: &str, body: Bytes, content_type: &str) -> Result<String, UploadError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| UploadError::Put(e.to_string()))?;

        info!("Uploaded media to s3://{}/{}", self.bucket, name);
        Ok(self.public_url(name))
    }
}

/// Object key for a re-hosted photo: `{peer_id}-{timestamp}{ext}`.
/// Later photos sharing a timestamp within one run get an `-{index}` suffix
/// so they do not overwrite the first one.
pub fn object_name(peer_id: i64, timestamp: i64, source_url: &str, index: usize) -> String {
    let ext = file_extension(source_url);
    if index == 0 {
        format!("{peer_id}-{timestamp}{ext}")
    } else {
        format!("{peer_id}-{timestamp}-{index}{ext}")
    }
}

/// Extension of the URL's last path segment (query and fragment ignored),
/// dot included. Defaults to `.jpg`.
pub fn file_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);
    let segment = match path.split_once('/') {
        Some((_, rest)) => rest.rsplit('/').next().unwrap_or(""),
        None => "",
    };
    match segment.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < segment.len() => segment[pos..].to_lowercase(),
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_extension_strips_query() {
        assert_eq!(
            file_extension("https://sun9-1.userapi.com/impg/abc/photo.png?size=1280x960&quality=95"),
            ".png"
        );
    }

    #[test]
    fn test_file_extension_defaults_to_jpg() {
        assert_eq!(file_extension("https://sun9-1.userapi.com/impg/abc"), ".jpg");
        assert_eq!(file_extension("https://cdn.example.com"), ".jpg");
        assert_eq!(file_extension("https://cdn.example.com/dir.v2/file"), ".jpg");
        assert_eq!(file_extension("https://cdn.example.com/.hidden"), ".jpg");
    }

    #[test]
    fn test_object_name_convention() {
        let url = "https://cdn.example.com/a/b.jpg?x=1";
        assert_eq!(object_name(12345, 1700000000, url, 0), "12345-1700000000.jpg");
        assert_eq!(object_name(12345, 1700000000, url, 2), "12345-1700000000-2.jpg");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(".png"), "image/png");
        assert_eq!(content_type_for(".jpg"), "image/jpeg");
        assert_eq!(content_type_for(".bin"), "image/jpeg");
    }
}
