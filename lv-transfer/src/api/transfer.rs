//! Transfer API: preview, export, parse and import
//!
//! Archives are addressed by file name inside the storage directory. Import
//! re-parses the named archive, so the API keeps no state between calls.

use std::path::PathBuf;

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::models::{ExportFilters, ExportReport, ImportOptions, ImportSummary};
use crate::services::{parse_archive, ArchiveSummary, ExportService, ImportReconciler, TransferArchive};
use crate::{ApiError, ApiResult, AppState};

/// Response of the preview endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub count: i64,
}

/// Archive addressed by file name
#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    pub file_name: String,
}

/// Import request; `transactional` can only narrow the server setting
#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub file_name: String,
    #[serde(flatten)]
    pub options: ImportOptions,
}

/// Parse an archive on the blocking pool
async fn load_archive(path: PathBuf) -> ApiResult<TransferArchive> {
    let archive = tokio::task::spawn_blocking(move || parse_archive(&path))
        .await
        .map_err(|e| ApiError::Internal(format!("Archive parser task failed: {}", e)))??;
    Ok(archive)
}

/// POST /api/admin/transfer/preview
pub async fn preview(
    State(state): State<AppState>,
    Json(filters): Json<ExportFilters>,
) -> ApiResult<Json<PreviewResponse>> {
    let result = ExportService::new(state.db.clone()).preview(&filters).await;
    let count = state.track(result.map_err(ApiError::from)).await?;
    Ok(Json(PreviewResponse { count }))
}

/// POST /api/admin/transfer/export
pub async fn export(
    State(state): State<AppState>,
    Json(filters): Json<ExportFilters>,
) -> ApiResult<Json<ExportReport>> {
    let dest = state.storage.new_export_path(lv_common::time::now());
    let result = ExportService::new(state.db.clone())
        .export_to_file(&filters, &dest, state.transfer.chunk_size)
        .await;
    let report = state.track(result.map_err(ApiError::from)).await?;
    Ok(Json(report))
}

/// POST /api/admin/transfer/parse
pub async fn parse(
    State(state): State<AppState>,
    Json(request): Json<ArchiveRequest>,
) -> ApiResult<Json<ArchiveSummary>> {
    let path = state.storage.existing(&request.file_name)?;
    let archive = state.track(load_archive(path).await).await?;
    Ok(Json(archive.summary()))
}

/// POST /api/admin/transfer/import
pub async fn import(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> ApiResult<Json<ImportSummary>> {
    let path = state.storage.existing(&request.file_name)?;
    let archive = state.track(load_archive(path).await).await?;

    let options = ImportOptions {
        transactional: request.options.transactional && state.transfer.transactional_import,
        ..request.options
    };

    tracing::info!(file_name = %request.file_name, "Importing archive");
    let result = ImportReconciler::new(state.db.clone()).import(&archive, &options).await;
    let summary = state.track(result.map_err(ApiError::from)).await?;
    Ok(Json(summary))
}

/// Build transfer routes
pub fn transfer_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/transfer/preview", post(preview))
        .route("/api/admin/transfer/export", post(export))
        .route("/api/admin/transfer/parse", post(parse))
        .route("/api/admin/transfer/import", post(import))
}
