//! Error taxonomy for the directory API.
//!
//! Store failures stay internal (logged, surfaced as a generic 500 message);
//! everything else maps to the HTTP status the original API contract uses:
//! 400 validation, 401 missing/invalid credentials, 403 wrong role/owner,
//! 404 single-entity miss. Duplicate records are validation errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unique-index violation (slug or email already taken).
    #[error("{0}")]
    Duplicate(String),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Erro no servidor")]
    Store(#[from] StoreError),

    #[error("Erro no servidor")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            // Duplicates are client errors; keep their message
            ApiError::Store(StoreError::Duplicate(msg)) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Store(err) => {
                tracing::error!(error = %err, "store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Erro no servidor".to_string())
            }
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "internal failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Erro no servidor".to_string())
            }
        };

        let body = Json(json!({ "success": false, "message": message }));
        (status, body).into_response()
    }
}
