//! Local-disk blob storage.
//!
//! Payloads live flat under a configured root directory, addressed by an
//! opaque UUID locator drawn at write time. Thumbnail derivatives sit next
//! to their source blob as `<locator>_<width>`.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use uuid::Uuid;

use super::error::{FileStoreError, FileStoreResult};

#[derive(Clone, Debug)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locators are generated internally, so this only guards against a
    /// corrupted metadata row steering a read outside the root.
    fn ensure_locator_safe(locator: &str) -> FileStoreResult<()> {
        if locator.is_empty()
            || locator.contains('/')
            || locator.contains('\\')
            || locator.contains("..")
        {
            return Err(FileStoreError::BlobNotFound(locator.to_string()));
        }
        Ok(())
    }

    fn blob_path(&self, locator: &str) -> PathBuf {
        self.root.join(locator)
    }

    /// Derived on-disk path for the `width` thumbnail of `locator`.
    pub fn variant_path(&self, locator: &str, width: u32) -> PathBuf {
        self.root.join(format!("{locator}_{width}"))
    }

    /// Write `bytes` under a fresh locator and return it.
    ///
    /// The payload goes to a temp file first and is renamed into place, so
    /// a reader never observes a partial write. `create_dir_all` keeps the
    /// first-use directory race between concurrent uploads harmless.
    pub async fn write(&self, bytes: &[u8]) -> FileStoreResult<String> {
        fs::create_dir_all(&self.root).await?;
        let locator = Uuid::new_v4().to_string();
        let tmp_path = self.root.join(format!(".tmp-{locator}"));
        self.commit(&tmp_path, &self.blob_path(&locator), bytes)
            .await?;
        Ok(locator)
    }

    /// Write (or overwrite) the `width` variant of an existing locator.
    /// A redelivered thumbnail job simply lands on the same path again.
    pub async fn write_variant(
        &self,
        locator: &str,
        width: u32,
        bytes: &[u8],
    ) -> FileStoreResult<()> {
        Self::ensure_locator_safe(locator)?;
        fs::create_dir_all(&self.root).await?;
        let tmp_path = self.root.join(format!(".tmp-{}", Uuid::new_v4()));
        self.commit(&tmp_path, &self.variant_path(locator, width), bytes)
            .await
    }

    async fn commit(&self, tmp_path: &Path, final_path: &Path, bytes: &[u8]) -> FileStoreResult<()> {
        let mut file = File::create(tmp_path).await?;
        if let Err(err) = write_all_durable(&mut file, bytes).await {
            let _ = fs::remove_file(tmp_path).await;
            return Err(FileStoreError::Io(err));
        }
        if let Err(err) = fs::rename(tmp_path, final_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(final_path).await?;
                fs::rename(tmp_path, final_path).await?;
            } else {
                let _ = fs::remove_file(tmp_path).await;
                return Err(FileStoreError::Io(err));
            }
        }
        Ok(())
    }

    /// Read a whole payload into memory. Fails with `BlobNotFound` when the
    /// metadata points at bytes that are gone.
    pub async fn read(&self, locator: &str) -> FileStoreResult<Vec<u8>> {
        Self::ensure_locator_safe(locator)?;
        match fs::read(self.blob_path(locator)).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(FileStoreError::BlobNotFound(locator.to_string()))
            }
            Err(err) => Err(FileStoreError::Io(err)),
        }
    }

    /// Open a payload (or one of its thumbnail variants) for streaming out.
    pub async fn reader(&self, locator: &str, width: Option<u32>) -> FileStoreResult<File> {
        Self::ensure_locator_safe(locator)?;
        let path = match width {
            Some(w) => self.variant_path(locator, w),
            None => self.blob_path(locator),
        };
        File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                FileStoreError::BlobNotFound(locator.to_string())
            } else {
                FileStoreError::Io(err)
            }
        })
    }

    /// Best-effort removal, used to roll back an upload whose metadata
    /// insert failed. A missing file is not an error.
    pub async fn remove(&self, locator: &str) -> FileStoreResult<()> {
        Self::ensure_locator_safe(locator)?;
        match fs::remove_file(self.blob_path(locator)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(FileStoreError::Io(err)),
        }
    }
}

async fn write_all_durable(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}
