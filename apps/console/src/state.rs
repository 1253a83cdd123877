use sqlx::PgPool;

use crate::auth::AdminAuth;
use crate::sync::SyncContext;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Reconciliation collaborators; its transcript store also serves transcript reads.
    pub sync: SyncContext,
    pub auth: AdminAuth,
}
