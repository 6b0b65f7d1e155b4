//! Error types for lv-transfer
//!
//! Component errors convert into [`ApiError`], which renders as
//! `{"error": {"code", "message"}}` with a matching HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::hierarchy::HierarchyError;
use crate::services::{ArchiveError, ExportError, IngestError, ReconcileError};
use crate::storage::StorageError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Caller is not on the admin allowlist (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request conflicts with stored data (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Well-formed request whose content cannot be processed (422)
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// lv-common error
    #[error("Common error: {0}")]
    Common(#[from] lv_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(err) => match err {
                lv_common::Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
                lv_common::Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
                lv_common::Error::Database(e) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", e.to_string())
                }
                corrupt @ lv_common::Error::CorruptRow { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "CORRUPT_DATA", corrupt.to_string())
                }
                other => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", other.to_string()),
            },
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidName(_) => ApiError::BadRequest(err.to_string()),
            StorageError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StorageError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ArchiveError> for ApiError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::MissingEntry(_)
            | ArchiveError::MalformedEntry { .. }
            | ArchiveError::Unreadable(_) => ApiError::Unprocessable(err.to_string()),
            ArchiveError::InvalidChunkSize | ArchiveError::Encode(_) | ArchiveError::Io(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<HierarchyError> for ApiError {
    fn from(err: HierarchyError) -> Self {
        match err {
            HierarchyError::EmptySlug(_) => ApiError::Unprocessable(err.to_string()),
            HierarchyError::SlugTaken { .. } => ApiError::Conflict(err.to_string()),
            HierarchyError::Common(e) => ApiError::Common(e),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::UnknownParentRegion(_) => ApiError::NotFound(err.to_string()),
            IngestError::MissingColumn(_) | IngestError::Csv(_) => ApiError::Unprocessable(err.to_string()),
            IngestError::Hierarchy(e) => e.into(),
            IngestError::Common(e) => ApiError::Common(e),
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::IdConflict { .. } => ApiError::Conflict(err.to_string()),
            ReconcileError::Common(e) => ApiError::Common(e),
            _ => ApiError::Unprocessable(err.to_string()),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Archive(e) => e.into(),
            ExportError::Common(e) => ApiError::Common(e),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
