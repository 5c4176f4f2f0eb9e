//! Asynchronous thumbnail generation.
//!
//! Drains [`ThumbnailJob`] messages produced by the upload pipeline and
//! writes resized copies of the source image next to its blob. Each width
//! is written independently; a crash mid-job leaves a partial set, which
//! download paths already tolerate. Regeneration overwrites in place.

use image::{GenericImageView, ImageFormat};
use sqlx::SqlitePool;
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::models::file::{FileKind, FileRecord};
use crate::services::blob_store::BlobStore;
use crate::services::error::{FileStoreError, FileStoreResult};
use crate::services::job_queue::ThumbnailJob;

/// Variant widths generated for every uploaded image.
pub const THUMBNAIL_WIDTHS: [u32; 3] = [100, 250, 500];

/// Long-lived consumer loop. Job failures are logged and the loop keeps
/// going; it only exits when every producer handle is gone.
pub async fn run(mut rx: UnboundedReceiver<ThumbnailJob>, db: Arc<SqlitePool>, blobs: BlobStore) {
    info!("thumbnail worker started");
    while let Some(job) = rx.recv().await {
        match process(&job, &db, &blobs).await {
            Ok(()) => debug!("thumbnail job for file {} done", job.file_id),
            Err(err) => warn!("thumbnail job for file {} failed: {}", job.file_id, err),
        }
    }
    info!("thumbnail worker stopped: queue closed");
}

/// Handle a single job: fetch the record, read the source bytes, render
/// all variants off the async runtime, write each one.
pub async fn process(
    job: &ThumbnailJob,
    db: &SqlitePool,
    blobs: &BlobStore,
) -> FileStoreResult<()> {
    let record: Option<FileRecord> = sqlx::query_as(
        "SELECT id, owner_id, name, kind, parent_id, is_public, local_path, created_at
         FROM files WHERE id = ?",
    )
    .bind(job.file_id)
    .fetch_optional(db)
    .await?;
    let record = record.ok_or(FileStoreError::NotFound)?;

    // A stale or forged job for another owner's file reads as missing.
    if record.owner_id != job.owner_id {
        return Err(FileStoreError::NotFound);
    }
    if record.kind != FileKind::Image {
        debug!("dropping thumbnail job for non-image file {}", record.id);
        return Ok(());
    }
    let locator = record.local_path.ok_or(FileStoreError::NotFound)?;

    let bytes = blobs.read(&locator).await?;
    let variants = tokio::task::spawn_blocking(move || render_variants(&bytes))
        .await
        .map_err(|err| FileStoreError::Io(std::io::Error::other(err)))??;

    for (width, data) in variants {
        blobs.write_variant(&locator, width, &data).await?;
    }
    Ok(())
}

/// Decode once, resize to each width preserving aspect ratio, re-encode in
/// the source format. CPU-bound, so callers run it under `spawn_blocking`.
fn render_variants(bytes: &[u8]) -> FileStoreResult<Vec<(u32, Vec<u8>)>> {
    let format = image::guess_format(bytes).unwrap_or(ImageFormat::Png);
    let source = image::load_from_memory(bytes)?;
    let (src_w, src_h) = (source.width().max(1), source.height().max(1));

    let mut out = Vec::with_capacity(THUMBNAIL_WIDTHS.len());
    for width in THUMBNAIL_WIDTHS {
        let height = ((u64::from(width) * u64::from(src_h)) / u64::from(src_w)).max(1) as u32;
        let resized = source.resize_exact(width, height, image::imageops::FilterType::Triangle);
        let mut buf = Cursor::new(Vec::new());
        resized.write_to(&mut buf, format)?;
        out.push((width, buf.into_inner()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::file_service::test_support::{fixture, upload};
    use crate::services::file_service::UploadRequest;
    use base64::{Engine as _, engine::general_purpose};
    use uuid::Uuid;

    fn png_fixture(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([120, 40, 200, 255]),
        ));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn png_upload(name: &str, width: u32, height: u32) -> UploadRequest {
        let data = general_purpose::STANDARD.encode(png_fixture(width, height));
        upload(name, "image", Some(&data))
    }

    #[tokio::test]
    async fn job_produces_all_three_variants() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let record = fx
            .service
            .create_file(owner, png_upload("a.png", 64, 64))
            .await
            .unwrap();

        let jobs = fx.queue.jobs();
        assert_eq!(jobs.len(), 1);
        process(&jobs[0], &fx.service.db, &fx.service.blobs)
            .await
            .unwrap();

        let locator = record.local_path.as_deref().unwrap();
        for width in THUMBNAIL_WIDTHS {
            let bytes = tokio::fs::read(fx.service.blobs.variant_path(locator, width))
                .await
                .unwrap();
            let thumb = image::load_from_memory(&bytes).unwrap();
            assert_eq!(thumb.width(), width);
        }
    }

    #[tokio::test]
    async fn variants_preserve_aspect_ratio() {
        let variants = render_variants(&png_fixture(200, 100)).unwrap();
        for (width, data) in variants {
            let thumb = image::load_from_memory(&data).unwrap();
            assert_eq!(thumb.width(), width);
            assert_eq!(thumb.height(), width / 2);
        }
    }

    #[tokio::test]
    async fn owner_mismatch_fails_the_job() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let record = fx
            .service
            .create_file(owner, png_upload("a.png", 16, 16))
            .await
            .unwrap();

        let forged = ThumbnailJob {
            owner_id: Uuid::new_v4(),
            file_id: record.id,
        };
        assert!(matches!(
            process(&forged, &fx.service.db, &fx.service.blobs).await,
            Err(FileStoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn missing_file_or_blob_fails_the_job() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();

        let phantom = ThumbnailJob {
            owner_id: owner,
            file_id: Uuid::new_v4(),
        };
        assert!(matches!(
            process(&phantom, &fx.service.db, &fx.service.blobs).await,
            Err(FileStoreError::NotFound)
        ));

        let record = fx
            .service
            .create_file(owner, png_upload("a.png", 16, 16))
            .await
            .unwrap();
        fx.service
            .blobs
            .remove(record.local_path.as_deref().unwrap())
            .await
            .unwrap();
        let job = fx.queue.jobs()[0];
        assert!(matches!(
            process(&job, &fx.service.db, &fx.service.blobs).await,
            Err(FileStoreError::BlobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn redelivered_job_regenerates_in_place() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let record = fx
            .service
            .create_file(owner, png_upload("a.png", 32, 32))
            .await
            .unwrap();
        let job = fx.queue.jobs()[0];

        process(&job, &fx.service.db, &fx.service.blobs)
            .await
            .unwrap();
        process(&job, &fx.service.db, &fx.service.blobs)
            .await
            .unwrap();

        let locator = record.local_path.as_deref().unwrap();
        let bytes = tokio::fs::read(fx.service.blobs.variant_path(locator, 500))
            .await
            .unwrap();
        assert_eq!(image::load_from_memory(&bytes).unwrap().width(), 500);
    }
}
