//! Blob storage for uploaded images.
//!
//! Files are keyed by the content hash computed by
//! [`hash_content`](crate::canonical::hash_content), so writing the same
//! bytes twice lands on the same path. The engine never reads blobs back.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` under `hash` and return the public locator.
    async fn put(&self, hash: &str, extension: &str, bytes: &[u8]) -> std::io::Result<String>;
}

/// Writes blobs into a directory served under a public URL prefix.
pub struct FsBlobStore {
    dir: PathBuf,
    public_prefix: String,
}

impl FsBlobStore {
    pub fn new(dir: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Lowercase extension of `file_name` including the dot, or `.png`.
pub fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_else(|| ".png".to_string())
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, hash: &str, extension: &str, bytes: &[u8]) -> std::io::Result<String> {
        let file_name = format!("{}{}", hash, extension);
        let path = self.dir.join(&file_name);

        if tokio::fs::try_exists(&path).await? {
            return Ok(format!("{}/{}", self.public_prefix, file_name));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        // Write then rename so a concurrent reader never sees a partial file
        let tmp = self.dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        Ok(format!("{}/{}", self.public_prefix, file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("shot.PNG"), ".png");
        assert_eq!(extension_of("photo.jpeg"), ".jpeg");
        assert_eq!(extension_of("noext"), ".png");
        assert_eq!(extension_of("weird.p/g"), ".png");
        assert_eq!(extension_of(""), ".png");
    }

    #[tokio::test]
    async fn test_put_writes_once_under_hash() {
        let tmp = TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path().join("uploads"), "/uploads/");

        let locator = store.put("abc123", ".png", b"bytes").await.unwrap();
        assert_eq!(locator, "/uploads/abc123.png");
        let written = std::fs::read(tmp.path().join("uploads/abc123.png")).unwrap();
        assert_eq!(written, b"bytes");

        let again = store.put("abc123", ".png", b"bytes").await.unwrap();
        assert_eq!(again, locator);
        let entries = std::fs::read_dir(store.dir()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
