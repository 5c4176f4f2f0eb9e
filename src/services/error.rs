//! Error taxonomy shared by the storage services and the upload pipeline.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("missing or unknown credential")]
    Unauthenticated,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("payload is not valid base64")]
    InvalidData(#[from] base64::DecodeError),
    #[error("parent not found")]
    ParentNotFound,
    #[error("parent is not a folder")]
    ParentNotFolder,
    #[error("file not found")]
    NotFound,
    #[error("folders have no content")]
    FolderHasNoContent,
    #[error("blob `{0}` not found")]
    BlobNotFound(String),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type FileStoreResult<T> = Result<T, FileStoreError>;
