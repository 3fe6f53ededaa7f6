// Segment storage rooted under the working directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, warn};

use crate::DownloadError;

/// Suffix of the temporary file a segment is written to before it is moved
/// into place.
const PARTIAL_SUFFIX: &str = ".part";

#[async_trait]
pub trait Storage: Send + Sync {
    /// Absolute path `name` maps to.
    fn path_of(&self, name: &str) -> PathBuf;

    async fn exists(&self, name: &str) -> bool;

    /// Writes `data` under `name`, replacing any previous file, and returns
    /// its absolute path. A failed write leaves nothing under `name`.
    async fn write(&self, name: &str, data: Bytes) -> Result<PathBuf, DownloadError>;
}

#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Creates the root directory if needed and anchors it to an absolute path.
    pub async fn create(root: impl AsRef<Path>) -> Result<Self, DownloadError> {
        fs::create_dir_all(root.as_ref()).await?;
        let root = std::path::absolute(root.as_ref())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Storage for FsStorage {
    fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    async fn exists(&self, name: &str) -> bool {
        fs::try_exists(self.path_of(name))
            .await
            .unwrap_or(false)
    }

    async fn write(&self, name: &str, data: Bytes) -> Result<PathBuf, DownloadError> {
        let path = self.path_of(name);
        let temp_path = self.path_of(&format!("{name}{PARTIAL_SUFFIX}"));

        // Only complete files may appear under the final name.
        if let Err(e) = fs::write(&temp_path, &data).await {
            warn!(path = %temp_path.display(), error = %e, "Failed to write segment file");
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&temp_path, &path).await {
            warn!(
                from = %temp_path.display(),
                to = %path.display(),
                error = %e,
                "Failed to rename temporary segment file"
            );
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), bytes = data.len(), "Segment written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_leaves_only_the_final_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::create(dir.path()).await.unwrap();

        let path = storage
            .write("seg0.ts", Bytes::from_static(b"payload"))
            .await
            .unwrap();

        assert_eq!(path, storage.root().join("seg0.ts"));
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
        assert!(storage.exists("seg0.ts").await);
        assert!(!storage.exists("seg0.ts.part").await);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_final_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::create(dir.path()).await.unwrap();
        // A directory in the way of the temporary file makes the write fail.
        std::fs::create_dir(dir.path().join("seg1.ts.part")).unwrap();

        let result = storage.write("seg1.ts", Bytes::from_static(b"payload")).await;

        assert!(matches!(result, Err(DownloadError::Io(_))));
        assert!(!storage.exists("seg1.ts").await);
    }

    #[tokio::test]
    async fn test_abandoned_partial_file_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::create(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("seg2.ts.part"), b"trunc").unwrap();

        assert!(!storage.exists("seg2.ts").await);

        let path = storage
            .write("seg2.ts", Bytes::from_static(b"complete"))
            .await
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"complete");
        assert!(!storage.exists("seg2.ts.part").await);
    }
}
