use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if no database connection can be derived.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub vk: VkConfig,
    pub storage: Option<StorageConfig>,
    pub auth_service_url: String,
    pub http_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct VkConfig {
    /// Absent token is not a startup error; reconciliation reports it per call.
    pub token: Option<String>,
    pub group_id: i64,
    pub api_url: String,
    pub api_version: String,
}

/// Object storage (MinIO / S3). Only present when credentials are configured.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Prefix for public object URLs, e.g. `http://localhost:9000`.
    pub public_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let app_host = optional_env("APP_HOST").unwrap_or_else(|| "localhost".to_string());

        let storage = match (
            optional_env("AWS_ACCESS_KEY_ID").or_else(|| optional_env("MINIO_LOGIN")),
            optional_env("AWS_SECRET_ACCESS_KEY").or_else(|| optional_env("MINIO_PWD")),
        ) {
            (Some(access_key_id), Some(secret_access_key)) => Some(StorageConfig {
                endpoint: optional_env("S3_ENDPOINT")
                    .unwrap_or_else(|| "http://minio:9000".to_string()),
                bucket: optional_env("S3_BUCKET").unwrap_or_else(|| "psih-photo".to_string()),
                access_key_id,
                secret_access_key,
                public_base_url: format!("http://{app_host}:9000"),
            }),
            _ => None,
        };

        let group_id = optional_env("VK_GROUP_ID")
            .map(|v| v.parse::<i64>())
            .transpose()
            .context("VK_GROUP_ID must be an integer")?
            .unwrap_or(0);

        let http_timeout_secs = optional_env("HTTP_TIMEOUT_SECS")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("HTTP_TIMEOUT_SECS must be a whole number of seconds")?
            .unwrap_or(30);

        Ok(Config {
            database_url: database_url()?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            vk: VkConfig {
                token: optional_env("VK_TOKEN"),
                group_id,
                api_url: optional_env("VK_API_URL")
                    .unwrap_or_else(|| "https://api.vk.com/method".to_string()),
                api_version: optional_env("VK_API_VERSION")
                    .unwrap_or_else(|| "5.199".to_string()),
            },
            storage,
            auth_service_url: optional_env("AUTH_SERVICE_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string()),
            http_timeout: Duration::from_secs(http_timeout_secs),
        })
    }
}

/// `DATABASE_URL` wins; otherwise the URL is composed from the `DB_*` parts.
fn database_url() -> Result<String> {
    if let Some(url) = optional_env("DATABASE_URL") {
        return Ok(url);
    }
    Ok(compose_database_url(
        &require_env("DB_USER")?,
        &require_env("DB_PASSWORD")?,
        &require_env("DB_HOST")?,
        &optional_env("DB_PORT").unwrap_or_else(|| "5432".to_string()),
        &require_env("DB_NAME")?,
    ))
}

fn compose_database_url(user: &str, password: &str, host: &str, port: &str, name: &str) -> String {
    format!("postgres://{user}:{password}@{host}:{port}/{name}")
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_database_url() {
        assert_eq!(
            compose_database_url("bot", "secret", "db", "5433", "chats"),
            "postgres://bot:secret@db:5433/chats"
        );
    }
}
