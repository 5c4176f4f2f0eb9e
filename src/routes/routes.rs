//! Defines routes for all file-store operations.
//!
//! ## Structure
//! - **File endpoints**
//!   - `POST /files` — upload a file, image, or folder
//!   - `GET  /files` — list files under a parent (supports parentId, page)
//!   - `GET  /files/{id}` — show one owned file
//!   - `PUT  /files/{id}/publish` — make a file publicly readable
//!   - `PUT  /files/{id}/unpublish` — revoke public access
//!   - `GET  /files/{id}/data` — download content (supports size=100|250|500)
//!
//! Authentication rides on the `X-Token` header; only the data endpoint
//! accepts anonymous callers, and only for public files.

use crate::{
    handlers::{
        file_handlers::{
            download_file, list_files, publish_file, show_file, unpublish_file, upload_file,
        },
        health_handlers::{healthz, readyz},
    },
    services::AppState,
};
use axum::{
    Router,
    routing::{get, put},
};

/// Build and return the router for the whole API surface.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // file endpoints
        .route("/files", get(list_files).post(upload_file))
        .route("/files/{id}", get(show_file))
        .route("/files/{id}/publish", put(publish_file))
        .route("/files/{id}/unpublish", put(unpublish_file))
        .route("/files/{id}/data", get(download_file))
}
