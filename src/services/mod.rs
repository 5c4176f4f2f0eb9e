//! Service layer: blob storage, file metadata + upload pipeline, session
//! resolution, and the thumbnail job queue.

pub mod blob_store;
pub mod error;
pub mod file_service;
pub mod job_queue;
pub mod session;

use std::sync::Arc;

use self::file_service::FileService;
use self::session::SessionStore;

/// Shared handler state: the file service plus the session resolver.
#[derive(Clone)]
pub struct AppState {
    pub files: FileService,
    pub sessions: Arc<dyn SessionStore>,
}
