use crate::services::error::FileStoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<FileStoreError> for AppError {
    fn from(err: FileStoreError) -> Self {
        match err {
            FileStoreError::Unauthenticated => {
                Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
            }
            FileStoreError::MissingField(field) => {
                Self::new(StatusCode::BAD_REQUEST, format!("Missing {field}"))
            }
            FileStoreError::InvalidData(_) => Self::new(StatusCode::BAD_REQUEST, "Invalid data"),
            FileStoreError::ParentNotFound => {
                Self::new(StatusCode::BAD_REQUEST, "Parent not found")
            }
            FileStoreError::ParentNotFolder => {
                Self::new(StatusCode::BAD_REQUEST, "Parent is not a folder")
            }
            // Ownership misses and missing bytes both read as absence so a
            // private file's existence never leaks through a status code.
            FileStoreError::NotFound | FileStoreError::BlobNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "Not found")
            }
            FileStoreError::FolderHasNoContent => {
                Self::new(StatusCode::BAD_REQUEST, "A folder doesn't have content")
            }
            FileStoreError::Image(err) => {
                tracing::error!("image processing failed: {}", err);
                Self::internal("Internal error")
            }
            FileStoreError::Sqlx(err) => {
                tracing::error!("database error: {}", err);
                Self::internal("Internal error")
            }
            FileStoreError::Io(err) => {
                tracing::error!("filesystem error: {}", err);
                Self::internal("Internal error")
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
