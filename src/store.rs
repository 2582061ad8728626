//! Content-addressed asset directory
//!
//! Files are named `<sha256>_<YYYYmmdd-HHMMSS>_<label>.<ext>` (the timestamp can be
//! turned off), so "is this content already stored?" is a prefix match on the digest.
//! New files are written to a hidden `.part` staging file and renamed into place, so a
//! crash never leaves a half-written file under a final name.

use crate::error::{Error, Result};
use crate::utils::image_extension;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Suffix of in-progress staging files, ignored by lookups
const STAGING_SUFFIX: &str = ".part";

/// Hex SHA-256 of `bytes`
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Directory of downloaded assets keyed by content digest
#[derive(Clone, Debug)]
pub struct AssetStore {
    dir: PathBuf,
    label: String,
    timestamp_in_name: bool,
}

impl AssetStore {
    /// Store rooted at `dir`; the directory is created by [`AssetStore::ensure_dir`]
    pub fn new(dir: impl Into<PathBuf>, label: impl Into<String>, timestamp_in_name: bool) -> Self {
        Self {
            dir: dir.into(),
            label: label.into(),
            timestamp_in_name,
        }
    }

    /// Store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the store directory if it does not exist
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.store_error(&self.dir, format!("cannot create directory: {}", e)))
    }

    /// File name for new content
    pub fn file_name(&self, hash: &str, content_type: &str) -> String {
        let ext = image_extension(content_type);
        if self.timestamp_in_name {
            let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
            format!("{}_{}_{}.{}", hash, stamp, self.label, ext)
        } else {
            format!("{}_{}.{}", hash, self.label, ext)
        }
    }

    /// Path of a stored file holding content with this digest, if any
    pub async fn find_by_hash(&self, hash: &str) -> Result<Option<PathBuf>> {
        let prefix = format!("{}_", hash);
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.store_error(&self.dir, format!("cannot list: {}", e))),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(&prefix) && !name.ends_with(STAGING_SUFFIX) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    /// Write novel content and return its final path
    ///
    /// Callers must hold the ledger lock so that two tasks never write the same digest.
    pub async fn write(&self, hash: &str, bytes: &[u8], content_type: &str) -> Result<PathBuf> {
        let final_path = self.dir.join(self.file_name(hash, content_type));
        let staging_path = self.dir.join(format!(".{}{}", hash, STAGING_SUFFIX));

        if let Err(e) = tokio::fs::write(&staging_path, bytes).await {
            self.discard(&staging_path).await;
            return Err(self.store_error(&staging_path, format!("write failed: {}", e)));
        }
        if let Err(e) = tokio::fs::rename(&staging_path, &final_path).await {
            self.discard(&staging_path).await;
            return Err(self.store_error(&final_path, format!("rename failed: {}", e)));
        }

        debug!(path = %final_path.display(), size = bytes.len(), "Stored asset");
        Ok(final_path)
    }

    /// Remove leftover staging files from an interrupted run
    pub async fn clean_staging(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let is_staging = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with('.') && n.ends_with(STAGING_SUFFIX));
            if is_staging {
                self.discard(&entry.path()).await;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn discard(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %path.display(), error = %e, "Failed to remove staging file");
        }
    }

    fn store_error(&self, path: &Path, reason: String) -> Error {
        Error::Store {
            path: path.to_path_buf(),
            reason,
        }
    }
}
