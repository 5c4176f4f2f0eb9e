//! FileService — the file metadata store and the upload pipeline built on
//! top of it. Durable metadata lives in SQLite; payloads go through the
//! [`BlobStore`]; image uploads hand a job to the [`JobQueue`].
//!
//! Every metadata write is scoped by `(id, owner_id)`, so concurrent
//! requests for different users cannot interfere. Cross-entity checks
//! (parent must be an owned folder) run at creation time only.

use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::blob_store::BlobStore;
use super::error::{FileStoreError, FileStoreResult};
use super::job_queue::{JobQueue, ThumbnailJob};
use crate::models::file::{FileKind, FileRecord};

/// Fixed page size for listings.
pub const PAGE_SIZE: i64 = 20;

const FILE_COLUMNS: &str =
    "id, owner_id, name, kind, parent_id, is_public, local_path, created_at";

/// Raw upload payload after JSON decoding, before validation. Field-level
/// validation is the store's job so every caller gets the same errors.
#[derive(Debug, Default)]
pub struct UploadRequest {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub data: Option<String>,
    /// Raw parent reference; absence, `"0"`, and the empty string all mean
    /// root. Resolved after shape validation so a malformed parent never
    /// masks a missing field.
    pub parent_id: Option<String>,
    pub is_public: bool,
}

fn resolve_parent(raw: Option<&str>) -> FileStoreResult<Option<Uuid>> {
    match raw {
        None | Some("") | Some("0") => Ok(None),
        Some(raw) => Uuid::parse_str(raw)
            .map(Some)
            .map_err(|_| FileStoreError::ParentNotFound),
    }
}

#[derive(Clone)]
pub struct FileService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Payload storage rooted at the configured directory.
    pub blobs: BlobStore,

    queue: Arc<dyn JobQueue>,
}

impl FileService {
    pub fn new(db: Arc<SqlitePool>, blobs: BlobStore, queue: Arc<dyn JobQueue>) -> Self {
        Self { db, blobs, queue }
    }

    /// Run the upload pipeline for `owner_id`.
    ///
    /// Stages, each terminal on failure: validate shape, decode payload,
    /// authorize parent, persist. Folders persist metadata only. Files and
    /// images write the blob first and insert metadata second, so a record
    /// never references a locator that does not exist; if the insert fails
    /// the blob is removed again. Image uploads finally enqueue a thumbnail
    /// job — enqueue failure is logged and never surfaced, the upload
    /// already succeeded.
    pub async fn create_file(
        &self,
        owner_id: Uuid,
        req: UploadRequest,
    ) -> FileStoreResult<FileRecord> {
        let name = match req.name {
            Some(name) if !name.is_empty() => name,
            _ => return Err(FileStoreError::MissingField("name")),
        };
        let kind = req
            .kind
            .as_deref()
            .and_then(FileKind::parse)
            .ok_or(FileStoreError::MissingField("type"))?;
        let payload = match kind {
            FileKind::Folder => None,
            _ => {
                let data = req.data.ok_or(FileStoreError::MissingField("data"))?;
                Some(general_purpose::STANDARD.decode(data)?)
            }
        };

        let parent_id = resolve_parent(req.parent_id.as_deref())?;
        if let Some(parent_id) = parent_id {
            let parent = self
                .find_for(parent_id, owner_id)
                .await?
                .ok_or(FileStoreError::ParentNotFound)?;
            if parent.kind != FileKind::Folder {
                return Err(FileStoreError::ParentNotFolder);
            }
        }

        let mut record = FileRecord {
            id: Uuid::new_v4(),
            owner_id,
            name,
            kind,
            parent_id,
            is_public: req.is_public,
            local_path: None,
            created_at: Utc::now(),
        };

        if let Some(bytes) = payload {
            let locator = self.blobs.write(&bytes).await?;
            record.local_path = Some(locator.clone());
            if let Err(err) = self.insert(&record).await {
                let _ = self.blobs.remove(&locator).await;
                return Err(err);
            }
        } else {
            self.insert(&record).await?;
        }

        if record.kind == FileKind::Image {
            let job = ThumbnailJob {
                owner_id,
                file_id: record.id,
            };
            if let Err(err) = self.queue.enqueue(job).await {
                warn!("failed to enqueue thumbnail job for {}: {}", record.id, err);
            } else {
                debug!("enqueued thumbnail job for {}", record.id);
            }
        }

        Ok(record)
    }

    async fn insert(&self, rec: &FileRecord) -> FileStoreResult<()> {
        sqlx::query(
            "INSERT INTO files (id, owner_id, name, kind, parent_id, is_public, local_path, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(rec.id)
        .bind(rec.owner_id)
        .bind(&rec.name)
        .bind(rec.kind)
        .bind(rec.parent_id)
        .bind(rec.is_public)
        .bind(&rec.local_path)
        .bind(rec.created_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// Point lookup by id without an ownership scope. Used where visibility
    /// is decided by the caller (downloads, the worker).
    pub async fn get_by_id(&self, id: Uuid) -> FileStoreResult<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    /// Point lookup scoped to an owner.
    pub async fn find_for(&self, id: Uuid, owner_id: Uuid) -> FileStoreResult<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ? AND owner_id = ?"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    /// Owner-scoped lookup for the Show operation. A file belonging to
    /// someone else reads as absent.
    pub async fn show(&self, id: Uuid, owner_id: Uuid) -> FileStoreResult<FileRecord> {
        self.find_for(id, owner_id)
            .await?
            .ok_or(FileStoreError::NotFound)
    }

    /// Paginated listing under one parent. Pages are zero-based and 20
    /// entries wide; ordering is insertion order (creation time ascending,
    /// rowid as tiebreak), stable absent concurrent writes. Pages past the
    /// end are empty, never an error.
    pub async fn list(
        &self,
        owner_id: Uuid,
        parent_id: Option<Uuid>,
        page: u32,
    ) -> FileStoreResult<Vec<FileRecord>> {
        let offset = i64::from(page) * PAGE_SIZE;
        let rows = match parent_id {
            Some(parent) => {
                sqlx::query_as::<_, FileRecord>(&format!(
                    "SELECT {FILE_COLUMNS} FROM files
                     WHERE owner_id = ? AND parent_id = ?
                     ORDER BY created_at ASC, rowid ASC LIMIT ? OFFSET ?"
                ))
                .bind(owner_id)
                .bind(parent)
                .bind(PAGE_SIZE)
                .bind(offset)
                .fetch_all(&*self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, FileRecord>(&format!(
                    "SELECT {FILE_COLUMNS} FROM files
                     WHERE owner_id = ? AND parent_id IS NULL
                     ORDER BY created_at ASC, rowid ASC LIMIT ? OFFSET ?"
                ))
                .bind(owner_id)
                .bind(PAGE_SIZE)
                .bind(offset)
                .fetch_all(&*self.db)
                .await?
            }
        };
        Ok(rows)
    }

    /// Flip the public flag. Requires ownership; setting the same value
    /// twice is fine.
    pub async fn set_public(
        &self,
        id: Uuid,
        owner_id: Uuid,
        value: bool,
    ) -> FileStoreResult<FileRecord> {
        let mut record = self
            .find_for(id, owner_id)
            .await?
            .ok_or(FileStoreError::NotFound)?;
        sqlx::query("UPDATE files SET is_public = ? WHERE id = ? AND owner_id = ?")
            .bind(value)
            .bind(id)
            .bind(owner_id)
            .execute(&*self.db)
            .await?;
        record.is_public = value;
        Ok(record)
    }

    /// Resolve a download: visibility first (an invisible file reads as
    /// absent), then kind (folders carry no content), then the blob or one
    /// of its thumbnail variants.
    pub async fn fetch_content(
        &self,
        id: Uuid,
        requester: Option<Uuid>,
        width: Option<u32>,
    ) -> FileStoreResult<(FileRecord, tokio::fs::File)> {
        let record = self.get_by_id(id).await?.ok_or(FileStoreError::NotFound)?;
        if !record.visible_to(requester) {
            return Err(FileStoreError::NotFound);
        }
        if record.kind == FileKind::Folder {
            return Err(FileStoreError::FolderHasNoContent);
        }
        let locator = record
            .local_path
            .clone()
            .ok_or(FileStoreError::NotFound)?;
        let file = self.blobs.reader(&locator, width).await?;
        Ok((record, file))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{fixture, upload};
    use super::*;
    use tokio::io::AsyncReadExt;

    fn b64(bytes: &[u8]) -> String {
        general_purpose::STANDARD.encode(bytes)
    }

    async fn read_all(file: &mut tokio::fs::File) -> Vec<u8> {
        let mut out = Vec::new();
        file.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn upload_then_download_round_trips() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let payload = b"the quick brown fox";

        let record = fx
            .service
            .create_file(owner, upload("f.txt", "file", Some(&b64(payload))))
            .await
            .unwrap();
        assert_eq!(record.kind, FileKind::File);
        assert!(!record.is_public);
        assert!(record.local_path.is_some());

        let (_, mut file) = fx
            .service
            .fetch_content(record.id, Some(owner), None)
            .await
            .unwrap();
        assert_eq!(read_all(&mut file).await, payload);
    }

    #[tokio::test]
    async fn missing_fields_persist_nothing() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();

        let cases: Vec<(UploadRequest, &str)> = vec![
            (upload("", "file", Some("aGk=")), "name"),
            (
                UploadRequest {
                    name: None,
                    ..upload("x", "file", Some("aGk="))
                },
                "name",
            ),
            (
                UploadRequest {
                    kind: None,
                    ..upload("x", "file", Some("aGk="))
                },
                "type",
            ),
            (upload("x", "blob", Some("aGk=")), "type"),
            (upload("x", "file", None), "data"),
            (upload("x", "image", None), "data"),
        ];
        for (req, field) in cases {
            match fx.service.create_file(owner, req).await {
                Err(FileStoreError::MissingField(f)) => assert_eq!(f, field),
                other => panic!("expected MissingField({field}), got {other:?}"),
            }
        }

        assert!(fx.service.list(owner, None, 0).await.unwrap().is_empty());
        assert!(fx.queue.jobs().is_empty());
    }

    #[tokio::test]
    async fn malformed_base64_is_rejected() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let err = fx
            .service
            .create_file(owner, upload("f.txt", "file", Some("not base64!!!")))
            .await
            .unwrap_err();
        assert!(matches!(err, FileStoreError::InvalidData(_)));
        assert!(fx.service.list(owner, None, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn folder_upload_needs_no_data() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let folder = fx
            .service
            .create_file(owner, upload("docs", "folder", None))
            .await
            .unwrap();
        assert_eq!(folder.kind, FileKind::Folder);
        assert!(folder.local_path.is_none());
    }

    #[tokio::test]
    async fn upload_under_folder_records_parent() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let folder = fx
            .service
            .create_file(owner, upload("docs", "folder", None))
            .await
            .unwrap();

        let req = UploadRequest {
            parent_id: Some(folder.id.to_string()),
            ..upload("f.txt", "file", Some("aGVsbG8="))
        };
        let child = fx.service.create_file(owner, req).await.unwrap();
        assert_eq!(child.parent_id, Some(folder.id));

        let listed = fx.service.list(owner, Some(folder.id), 0).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, child.id);
    }

    #[tokio::test]
    async fn parent_must_exist_and_be_an_owned_folder() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        let plain = fx
            .service
            .create_file(owner, upload("f.txt", "file", Some("aGk=")))
            .await
            .unwrap();

        let under_file = UploadRequest {
            parent_id: Some(plain.id.to_string()),
            ..upload("g.txt", "file", Some("aGk="))
        };
        assert!(matches!(
            fx.service.create_file(owner, under_file).await,
            Err(FileStoreError::ParentNotFolder)
        ));

        let under_missing = UploadRequest {
            parent_id: Some(Uuid::new_v4().to_string()),
            ..upload("g.txt", "file", Some("aGk="))
        };
        assert!(matches!(
            fx.service.create_file(owner, under_missing).await,
            Err(FileStoreError::ParentNotFound)
        ));

        // someone else's folder reads as missing
        let foreign_folder = fx
            .service
            .create_file(other, upload("theirs", "folder", None))
            .await
            .unwrap();
        let under_foreign = UploadRequest {
            parent_id: Some(foreign_folder.id.to_string()),
            ..upload("g.txt", "file", Some("aGk="))
        };
        assert!(matches!(
            fx.service.create_file(owner, under_foreign).await,
            Err(FileStoreError::ParentNotFound)
        ));

        assert_eq!(fx.service.list(owner, None, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shape_errors_win_over_parent_errors() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();

        // a malformed parent never masks a missing field
        let req = UploadRequest {
            name: None,
            parent_id: Some("not-a-uuid".into()),
            ..upload("x", "file", Some("aGk="))
        };
        assert!(matches!(
            fx.service.create_file(owner, req).await,
            Err(FileStoreError::MissingField("name"))
        ));

        // with the shape valid, the same parent is the error
        let req = UploadRequest {
            parent_id: Some("not-a-uuid".into()),
            ..upload("x", "file", Some("aGk="))
        };
        assert!(matches!(
            fx.service.create_file(owner, req).await,
            Err(FileStoreError::ParentNotFound)
        ));
    }

    #[tokio::test]
    async fn root_sentinel_forms_all_mean_no_parent() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        for (i, parent) in [None, Some("0".to_string()), Some(String::new())]
            .into_iter()
            .enumerate()
        {
            let req = UploadRequest {
                parent_id: parent,
                ..upload(&format!("d{i}"), "folder", None)
            };
            let record = fx.service.create_file(owner, req).await.unwrap();
            assert_eq!(record.parent_id, None);
        }
        assert_eq!(fx.service.list(owner, None, 0).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn failed_insert_removes_the_blob() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        sqlx::query("DROP TABLE files")
            .execute(&*fx.service.db)
            .await
            .unwrap();

        let err = fx
            .service
            .create_file(owner, upload("f.txt", "file", Some("aGk=")))
            .await
            .unwrap_err();
        assert!(matches!(err, FileStoreError::Sqlx(_)));

        let mut entries = tokio::fs::read_dir(fx.blob_root.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enqueue_failure_does_not_fail_the_upload() {
        use crate::services::job_queue::FailingQueue;
        use tempfile::TempDir;

        let db = test_support::pool_with_schema().await;
        let blob_root = TempDir::new().unwrap();
        let service = FileService::new(
            db,
            BlobStore::new(blob_root.path()),
            Arc::new(FailingQueue),
        );

        let owner = Uuid::new_v4();
        let record = service
            .create_file(owner, upload("a.png", "image", Some("aGVsbG8=")))
            .await
            .unwrap();

        // both the metadata row and the blob survived the dropped job
        let found = service.show(record.id, owner).await.unwrap();
        assert_eq!(found.id, record.id);
        let bytes = service
            .blobs
            .read(record.local_path.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn image_upload_enqueues_exactly_one_job() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let record = fx
            .service
            .create_file(owner, upload("a.png", "image", Some("aGVsbG8=")))
            .await
            .unwrap();

        let jobs = fx.queue.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].file_id, record.id);
        assert_eq!(jobs[0].owner_id, owner);

        // plain files never enqueue
        fx.service
            .create_file(owner, upload("f.txt", "file", Some("aGk=")))
            .await
            .unwrap();
        assert_eq!(fx.queue.jobs().len(), 1);
    }

    #[tokio::test]
    async fn listing_is_paginated_at_twenty() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        for i in 0..25 {
            fx.service
                .create_file(owner, upload(&format!("f{i:02}"), "folder", None))
                .await
                .unwrap();
        }

        let first = fx.service.list(owner, None, 0).await.unwrap();
        assert_eq!(first.len(), 20);
        assert_eq!(first[0].name, "f00");

        let second = fx.service.list(owner, None, 1).await.unwrap();
        assert_eq!(second.len(), 5);
        assert_eq!(second[0].name, "f20");

        assert!(fx.service.list(owner, None, 7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_then_unpublish_is_idempotent() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let record = fx
            .service
            .create_file(owner, upload("f.txt", "file", Some("aGk=")))
            .await
            .unwrap();

        let published = fx.service.set_public(record.id, owner, true).await.unwrap();
        assert!(published.is_public);
        let published_again = fx.service.set_public(record.id, owner, true).await.unwrap();
        assert!(published_again.is_public);

        let reverted = fx
            .service
            .set_public(record.id, owner, false)
            .await
            .unwrap();
        assert!(!reverted.is_public);
        assert_eq!(reverted.id, record.id);
        assert_eq!(reverted.name, record.name);
        assert_eq!(reverted.parent_id, record.parent_id);

        assert!(matches!(
            fx.service.set_public(Uuid::new_v4(), owner, true).await,
            Err(FileStoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn private_files_are_invisible_to_others() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let record = fx
            .service
            .create_file(owner, upload("secret.txt", "file", Some("aGk=")))
            .await
            .unwrap();

        assert!(matches!(
            fx.service.show(record.id, stranger).await,
            Err(FileStoreError::NotFound)
        ));
        assert!(matches!(
            fx.service
                .fetch_content(record.id, Some(stranger), None)
                .await,
            Err(FileStoreError::NotFound)
        ));
        assert!(matches!(
            fx.service.fetch_content(record.id, None, None).await,
            Err(FileStoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn public_files_download_without_credentials() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let record = fx
            .service
            .create_file(owner, upload("open.txt", "file", Some(&b64(b"shared"))))
            .await
            .unwrap();
        fx.service.set_public(record.id, owner, true).await.unwrap();

        let (_, mut file) = fx
            .service
            .fetch_content(record.id, None, None)
            .await
            .unwrap();
        assert_eq!(read_all(&mut file).await, b"shared");
    }

    #[tokio::test]
    async fn folder_download_is_refused() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let folder = fx
            .service
            .create_file(owner, upload("docs", "folder", None))
            .await
            .unwrap();
        assert!(matches!(
            fx.service.fetch_content(folder.id, Some(owner), None).await,
            Err(FileStoreError::FolderHasNoContent)
        ));
    }

    #[tokio::test]
    async fn missing_blob_surfaces_as_blob_not_found() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let record = fx
            .service
            .create_file(owner, upload("f.txt", "file", Some("aGk=")))
            .await
            .unwrap();
        fx.service
            .blobs
            .remove(record.local_path.as_deref().unwrap())
            .await
            .unwrap();

        assert!(matches!(
            fx.service.fetch_content(record.id, Some(owner), None).await,
            Err(FileStoreError::BlobNotFound(_))
        ));
    }
}
