//! lv-transfer library interface
//!
//! Region/business transfer pipeline: CSV region ingestion, archive
//! export/import and the admin HTTP API that exposes them.

pub mod api;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod models;
pub mod services;
pub mod storage;

pub use crate::error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use lv_common::config::{AdminAllowlist, TransferConfig};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::services::GeocodeQueue;
use crate::storage::ArchiveStorage;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Directory holding archives and CSV files
    pub storage: ArchiveStorage,
    pub allowlist: Arc<AdminAllowlist>,
    /// `None` when geocoding is disabled
    pub geocode_queue: Option<GeocodeQueue>,
    pub transfer: TransferConfig,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        storage: ArchiveStorage,
        allowlist: AdminAllowlist,
        geocode_queue: Option<GeocodeQueue>,
        transfer: TransferConfig,
    ) -> Self {
        Self {
            db,
            storage,
            allowlist: Arc::new(allowlist),
            geocode_queue,
            transfer,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember a failed operation for `/health`, passing the result through
    pub async fn track<T>(&self, result: ApiResult<T>) -> ApiResult<T> {
        if let Err(error) = &result {
            tracing::error!(error = %error, "Admin operation failed");
            *self.last_error.write().await = Some(error.to_string());
        }
        result
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .merge(api::transfer_routes())
        .merge(api::region_routes())
        .layer(api::AdminAuthLayer::new(state.allowlist.clone()));

    Router::new()
        .merge(api::health_routes())
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
