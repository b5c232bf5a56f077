// ============================
// crates/backend-lib/src/storage.rs
// ============================
//! Image storage abstraction with flat-file implementation.
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs as tokio_fs;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;

/// Metadata recorded for each stored image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMeta {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub distance: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied part of the metadata
#[derive(Debug, Clone, Default)]
pub struct NewImage {
    pub filename: String,
    pub content_type: String,
    pub message: Option<String>,
    pub distance: Option<String>,
}

/// Trait for image storage backends
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persist an image and return its metadata (including the new id)
    async fn save_image(&self, bytes: Vec<u8>, image: NewImage) -> Result<ImageMeta, AppError>;

    /// All stored images, newest first
    async fn list_images(&self) -> Result<Vec<ImageMeta>, AppError>;

    /// Delete an image; `false` when no such image exists
    async fn delete_image(&self, id: &str) -> Result<bool, AppError>;
}

/// Flat-file implementation of the `ImageStore` trait.
///
/// Layout: `<root>/images/<id>.bin` holds the bytes and `<root>/images/<id>.json`
/// the metadata. An image exists exactly when its JSON file does.
#[derive(Clone, Debug)]
pub struct FlatFileImageStore {
    dir: PathBuf,
}

impl FlatFileImageStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, AppError> {
        let dir = root.as_ref().join("images");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn blob_path(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{id}.bin"))
    }

    fn meta_path(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl ImageStore for FlatFileImageStore {
    async fn save_image(&self, bytes: Vec<u8>, image: NewImage) -> Result<ImageMeta, AppError> {
        let id = Uuid::new_v4();
        let meta = ImageMeta {
            id: id.to_string(),
            filename: image.filename,
            content_type: image.content_type,
            size: bytes.len() as u64,
            message: image.message,
            distance: image.distance,
            created_at: Utc::now(),
        };

        // bytes first: a metadata file never points at a missing blob
        tokio_fs::write(self.blob_path(&id), &bytes).await?;
        let json = serde_json::to_string_pretty(&meta)?;
        tokio_fs::write(self.meta_path(&id), json).await?;

        Ok(meta)
    }

    async fn list_images(&self) -> Result<Vec<ImageMeta>, AppError> {
        let mut images = Vec::new();
        let mut entries = tokio_fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = match tokio_fs::read_to_string(&path).await {
                Ok(content) => content,
                // deleted between read_dir and read
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_str::<ImageMeta>(&content) {
                Ok(meta) => images.push(meta),
                Err(e) => warn!(path = %path.display(), "skipping unreadable image metadata: {e}"),
            }
        }

        images.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(images)
    }

    async fn delete_image(&self, id: &str) -> Result<bool, AppError> {
        // only well-formed ids ever map to a path inside the store
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(false);
        };

        match tokio_fs::remove_file(self.meta_path(&id)).await {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        match tokio_fs::remove_file(self.blob_path(&id)).await {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(%id, "image blob already missing");
            },
            Err(e) => return Err(e.into()),
        }
        Ok(true)
    }
}
