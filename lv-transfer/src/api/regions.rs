//! Region API: CSV ingestion

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::models::{IngestOptions, IngestSummary};
use crate::services::CsvIngester;
use crate::{ApiError, ApiResult, AppState};

/// CSV ingestion request; the file must already be in the storage directory
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub file_name: String,
    #[serde(flatten)]
    pub options: IngestOptions,
}

/// POST /api/admin/regions/import-csv
pub async fn import_csv(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<Json<IngestSummary>> {
    let path = state.storage.existing(&request.file_name)?;

    let ingester = CsvIngester::new(state.db.clone(), state.geocode_queue.clone());
    let result = ingester.ingest_file(&path, &request.options).await;
    let summary = state.track(result.map_err(ApiError::from)).await?;

    Ok(Json(summary))
}

/// Build region routes
pub fn region_routes() -> Router<AppState> {
    Router::new().route("/api/admin/regions/import-csv", post(import_csv))
}
