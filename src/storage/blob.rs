//! Image object store on the local filesystem.
//!
//! File structure:
//! - `{storage_path}/{name}` — uploaded image, served publicly under `/images/{name}`
//!
//! Objects are write-once: an existing name is never overwritten.

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Error type for blob operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid object name: {0}")]
    InvalidName(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),
}

/// Accepted image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl ImageType {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(ImageType::Jpeg),
            "image/png" => Some(ImageType::Png),
            "image/webp" => Some(ImageType::Webp),
            "image/gif" => Some(ImageType::Gif),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageType::Jpeg => "jpg",
            ImageType::Png => "png",
            ImageType::Webp => "webp",
            ImageType::Gif => "gif",
        }
    }

    /// Whether `content` starts with this format's signature.
    pub fn matches(self, content: &[u8]) -> bool {
        match self {
            ImageType::Jpeg => content.starts_with(&[0xff, 0xd8, 0xff]),
            ImageType::Png => content.starts_with(b"\x89PNG\r\n\x1a\n"),
            ImageType::Webp => {
                content.len() >= 12 && &content[..4] == b"RIFF" && &content[8..12] == b"WEBP"
            }
            ImageType::Gif => content.starts_with(b"GIF87a") || content.starts_with(b"GIF89a"),
        }
    }
}

/// Object name for an upload: address prefix, upload time in ms, extension.
pub fn object_name(uploader: &str, image_type: ImageType, now: DateTime<Utc>) -> String {
    let prefix: String = uploader.chars().take(10).collect();
    format!(
        "{}-{}.{}",
        prefix,
        now.timestamp_millis(),
        image_type.extension()
    )
    .chars()
    .map(|c| {
        if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
            c
        } else {
            '_'
        }
    })
    .collect()
}

fn blob_path(storage_path: &Path, name: &str) -> Result<PathBuf, BlobError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if !valid {
        return Err(BlobError::InvalidName(name.to_string()));
    }
    Ok(storage_path.join(name))
}

/// Initialize the storage directory.
///
/// Creates the storage directory if it doesn't exist.
pub async fn init_storage(storage_path: &Path) -> Result<(), BlobError> {
    fs::create_dir_all(storage_path).await?;
    Ok(())
}

/// Write a new object to disk.
///
/// Writes to a temp file and hard-links it into place, so readers never see
/// a partial image and an object that appears meanwhile is never replaced.
/// The temp file is removed on every path.
pub async fn write_blob(storage_path: &Path, name: &str, content: &[u8]) -> Result<(), BlobError> {
    let path = blob_path(storage_path, name)?;

    if fs::try_exists(&path).await? {
        return Err(BlobError::AlreadyExists(name.to_string()));
    }

    // Unique per write so concurrent uploads never share a temp file
    let temp_path = storage_path.join(format!(".{}.{}.tmp", name, nanoid::nanoid!(8)));
    let published = publish(&temp_path, &path, content).await;

    if let Err(e) = fs::remove_file(&temp_path).await {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(temp = %temp_path.display(), error = %e, "Failed to remove temp image file");
        }
    }

    match published {
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(BlobError::AlreadyExists(name.to_string()))
        }
        other => Ok(other?),
    }
}

async fn publish(temp_path: &Path, path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(temp_path).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    // Fails with AlreadyExists instead of overwriting
    fs::hard_link(temp_path, path).await
}
