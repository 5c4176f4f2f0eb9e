//! HTTP handlers for upload, listing, publishing, and download.
//!
//! Every handler resolves the caller through the session seam first and
//! delegates storage concerns to `FileService`.

use crate::{
    errors::AppError,
    models::file::FileResponse,
    services::{AppState, error::FileStoreError, file_service::UploadRequest},
    workers::thumbnail_worker::THUMBNAIL_WIDTHS,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

const TOKEN_HEADER: &str = "x-token";

/// Upload request body. `parentId` accepts both the numeric and the
/// textual form of the root sentinel (`0` / `"0"`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadBody {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub data: Option<String>,
    pub parent_id: Option<ParentRef>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ParentRef {
    Num(u64),
    Text(String),
}

/// Query params accepted by the listing endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub parent_id: Option<String>,
    pub page: Option<u32>,
}

/// Query params accepted by the download endpoint.
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub size: Option<u32>,
}

/// Resolve the `X-Token` header to a user, failing with 401.
async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<Uuid, AppError> {
    maybe_user(state, headers)
        .await?
        .ok_or_else(|| AppError::from(FileStoreError::Unauthenticated))
}

/// Resolve the `X-Token` header if present; anonymous callers get `None`.
async fn maybe_user(state: &AppState, headers: &HeaderMap) -> Result<Option<Uuid>, AppError> {
    let Some(token) = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };
    Ok(state.sessions.resolve(token).await?)
}

/// Flatten the numeric/textual `parentId` forms to one raw string; the
/// service resolves it after shape validation.
fn parent_text(parent: Option<ParentRef>) -> Option<String> {
    match parent {
        None => None,
        Some(ParentRef::Num(n)) => Some(n.to_string()),
        Some(ParentRef::Text(s)) => Some(s),
    }
}

/// Ids arrive as path strings; anything that is not a UUID cannot name an
/// existing file, so it reads as absent rather than malformed.
fn parse_file_id(raw: &str) -> Result<Uuid, FileStoreError> {
    Uuid::parse_str(raw).map_err(|_| FileStoreError::NotFound)
}

/// POST `/files` — run the upload pipeline.
pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UploadBody>,
) -> Result<impl IntoResponse, AppError> {
    let owner = require_user(&state, &headers).await?;
    let record = state
        .files
        .create_file(
            owner,
            UploadRequest {
                name: body.name,
                kind: body.kind,
                data: body.data,
                parent_id: parent_text(body.parent_id),
                is_public: body.is_public,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(FileResponse::from(&record))))
}

/// GET `/files/{id}` — show one owned file.
pub async fn show_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let owner = require_user(&state, &headers).await?;
    let record = state.files.show(parse_file_id(&id)?, owner).await?;
    Ok(Json(FileResponse::from(&record)))
}

/// GET `/files?parentId=&page=` — paginated listing under one parent.
pub async fn list_files(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let owner = require_user(&state, &headers).await?;
    // An unparseable parentId names nothing, so it matches nothing.
    let parent = match q.parent_id.as_deref() {
        None | Some("") | Some("0") => None,
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => return Ok(Json(Vec::<FileResponse>::new())),
        },
    };
    let records = state
        .files
        .list(owner, parent, q.page.unwrap_or(0))
        .await?;
    Ok(Json(
        records.iter().map(FileResponse::from).collect::<Vec<_>>(),
    ))
}

/// PUT `/files/{id}/publish`
pub async fn publish_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    set_public(state, id, headers, true).await
}

/// PUT `/files/{id}/unpublish`
pub async fn unpublish_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    set_public(state, id, headers, false).await
}

async fn set_public(
    state: AppState,
    id: String,
    headers: HeaderMap,
    value: bool,
) -> Result<Json<FileResponse>, AppError> {
    let owner = require_user(&state, &headers).await?;
    let record = state
        .files
        .set_public(parse_file_id(&id)?, owner, value)
        .await?;
    Ok(Json(FileResponse::from(&record)))
}

/// GET `/files/{id}/data?size=` — stream the payload, or one of its
/// thumbnail variants, with a content type guessed from the file name.
/// Credentials are optional: public files download anonymously.
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<DownloadQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let requester = maybe_user(&state, &headers).await?;
    if let Some(size) = q.size {
        if !THUMBNAIL_WIDTHS.contains(&size) {
            return Err(AppError::new(StatusCode::BAD_REQUEST, "Invalid size"));
        }
    }
    let (record, file) = state
        .files
        .fetch_content(parse_file_id(&id)?, requester, q.size)
        .await?;

    let content_type = mime_guess::from_path(&record.name).first_or_octet_stream();
    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type.as_ref())
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    Ok(response)
}
