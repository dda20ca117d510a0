//! Filesystem storage for images attached to posts.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use slug::slugify;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

/// Directory, relative to the media root, that post images are written to.
pub const POST_IMAGE_DIR: &str = "posts";

const CHECKSUM_SUFFIX_LEN: usize = 8;

/// Errors that can occur while interacting with the upload storage backend.
#[derive(Debug, Error)]
pub enum UploadStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("uploaded file is empty")]
    EmptyPayload,
}

/// Result of storing an upload payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Path relative to the media root, always using `/` separators.
    pub stored_path: String,
    pub checksum: String,
    pub size_bytes: u64,
}

/// Filesystem-backed media storage.
#[derive(Debug)]
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Store a post image under `posts/`, keeping the original file name when it is free.
    ///
    /// A taken name gets a short content checksum appended to its stem, and a
    /// random suffix when that is taken too.
    pub async fn store_post_image(
        &self,
        original_name: &str,
        data: Bytes,
    ) -> Result<StoredUpload, UploadStorageError> {
        if data.is_empty() {
            return Err(UploadStorageError::EmptyPayload);
        }

        let digest = Sha256::digest(&data);
        let checksum = hex::encode(&digest[..]);
        let (stem, extension) = sanitize_filename(original_name);
        fs::create_dir_all(self.root.join(POST_IMAGE_DIR)).await?;

        let short = &checksum[..CHECKSUM_SUFFIX_LEN];
        let mut candidates = vec![
            join_name(&stem, None, extension.as_deref()),
            join_name(&stem, Some(short), extension.as_deref()),
        ]
        .into_iter();

        // Each stored file belongs to exactly one post.
        let stored_path = loop {
            let candidate = match candidates.next() {
                Some(candidate) => candidate,
                None => {
                    let unique = Uuid::new_v4().simple().to_string();
                    join_name(&stem, Some(&unique), extension.as_deref())
                }
            };
            match self.write_new(&candidate, &data).await {
                Ok(()) => break candidate,
                Err(UploadStorageError::Io(err))
                    if err.kind() == std::io::ErrorKind::AlreadyExists =>
                {
                    continue;
                }
                Err(err) => return Err(err),
            }
        };

        Ok(StoredUpload {
            stored_path,
            checksum,
            size_bytes: data.len() as u64,
        })
    }

    /// Attempt to read the stored payload into memory.
    pub async fn read(&self, stored_path: &str) -> Result<Bytes, UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Remove the stored payload. Missing files are treated as success.
    pub async fn delete(&self, stored_path: &str) -> Result<(), UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        match fs::remove_file(&absolute).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(UploadStorageError::Io(err)),
        }
    }

    async fn write_new(&self, stored_path: &str, data: &[u8]) -> Result<(), UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&absolute)
            .await?;
        if let Err(err) = file.write_all(data).await {
            drop(file);
            let _ = fs::remove_file(&absolute).await;
            return Err(err.into());
        }
        file.flush().await?;
        Ok(())
    }

    /// Resolve the absolute filesystem path for a stored upload.
    fn resolve(&self, stored_path: &str) -> Result<PathBuf, UploadStorageError> {
        let relative = Path::new(stored_path);
        if stored_path.is_empty()
            || relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(UploadStorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

fn join_name(stem: &str, suffix: Option<&str>, extension: Option<&str>) -> String {
    let mut name = format!("{POST_IMAGE_DIR}/{stem}");
    if let Some(suffix) = suffix {
        name.push('-');
        name.push_str(suffix);
    }
    if let Some(extension) = extension {
        name.push('.');
        name.push_str(extension);
    }
    name
}

fn sanitize_filename(original: &str) -> (String, Option<String>) {
    // Browsers on some platforms send the full client path.
    let file_name = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .map(slugify)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "image".to_string());

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric()));

    (stem, extension)
}
