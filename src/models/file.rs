//! Metadata record for a stored file or folder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Kind of entry a [`FileRecord`] represents.
///
/// Folders carry no payload. Files and images own a blob locator; images
/// additionally get thumbnail derivatives generated asynchronously.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum FileKind {
    Folder,
    File,
    Image,
}

impl FileKind {
    /// Parse the client-supplied `type` field. Returns `None` for anything
    /// outside the accepted set.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "folder" => Some(Self::Folder),
            "file" => Some(Self::File),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

/// A single row in the `files` table.
///
/// `parent_id = None` is the root sentinel. `local_path` is the opaque blob
/// locator, present exactly when `kind != Folder`, and never exposed to
/// clients.
#[derive(Clone, FromRow, Debug)]
pub struct FileRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub kind: FileKind,
    pub parent_id: Option<Uuid>,
    pub is_public: bool,
    pub local_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    /// Owner-or-public visibility rule used by every read path.
    pub fn visible_to(&self, requester: Option<Uuid>) -> bool {
        self.is_public || requester == Some(self.owner_id)
    }
}

/// Client-facing representation of a [`FileRecord`].
///
/// The root sentinel is rendered as the string `"0"`, matching the form
/// accepted on input.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub is_public: bool,
    pub parent_id: String,
}

impl From<&FileRecord> for FileResponse {
    fn from(rec: &FileRecord) -> Self {
        Self {
            id: rec.id,
            user_id: rec.owner_id,
            name: rec.name.clone(),
            kind: rec.kind,
            is_public: rec.is_public,
            parent_id: rec
                .parent_id
                .map(|p| p.to_string())
                .unwrap_or_else(|| "0".into()),
        }
    }
}
