mod auth;
mod chats;
mod config;
mod db;
mod errors;
mod media;
mod models;
mod routes;
mod state;
mod sync;
mod transcript;
mod vk;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::AdminAuth;
use crate::config::{Config, StorageConfig};
use crate::db::create_pool;
use crate::media::{HttpMediaFetcher, MediaFetcher, ObjectStore, S3ObjectStore};
use crate::routes::build_router;
use crate::state::AppState;
use crate::sync::{ConversationLocks, SyncContext};
use crate::transcript::PgTranscriptStore;
use crate::vk::{HistorySource, VkClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on a missing database URL)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting console API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize S3 / MinIO (optional: photos keep their VK URLs without it)
    let uploader: Option<Arc<dyn ObjectStore>> = match &config.storage {
        Some(storage) => {
            let s3 = build_s3_client(storage).await;
            info!("S3 client initialized (bucket: {})", storage.bucket);
            let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(
                s3,
                storage.bucket.clone(),
                storage.public_base_url.clone(),
            ));
            Some(store)
        }
        None => {
            warn!("Object storage not configured, VK photos will not be re-hosted");
            None
        }
    };

    // Initialize VK client
    let history: Option<Arc<dyn HistorySource>> = match &config.vk.token {
        Some(token) => {
            info!("VK client initialized (group id: {})", config.vk.group_id);
            let client: Arc<dyn HistorySource> = Arc::new(VkClient::new(
                token.clone(),
                config.vk.api_url.clone(),
                config.vk.api_version.clone(),
                config.http_timeout,
            ));
            Some(client)
        }
        None => {
            warn!("VK_TOKEN is not set, VK synchronization is disabled");
            None
        }
    };

    let media: Arc<dyn MediaFetcher> = Arc::new(HttpMediaFetcher::new(config.http_timeout));

    let sync = SyncContext {
        store: Arc::new(PgTranscriptStore::new(db.clone())),
        history,
        media,
        uploader,
        group_id: config.vk.group_id,
        locks: ConversationLocks::new(),
    };

    // Build app state
    let state = AppState {
        db,
        sync,
        auth: AdminAuth::new(&config.auth_service_url, config.http_timeout),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict CORS to the console front-end origin

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (path-style addressing).
async fn build_s3_client(storage: &StorageConfig) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &storage.access_key_id,
        &storage.secret_access_key,
        None,
        None,
        "console-static",
    );

    let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&storage.endpoint)
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}
