use super::{SignedUrlOptions, StorageBackend};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Local filesystem backend rooted at a directory. Objects are plain files
/// under the root; "signed" URLs are public URLs under `base_url` since the
/// filesystem has no signing story.
pub struct DiskBackend {
    name: String,
    root: PathBuf,
    base_url: String,
}

impl DiskBackend {
    pub fn new(name: String, root: PathBuf, base_url: String) -> Self {
        Self {
            name,
            root,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Resolves a key under the root, rejecting traversal components.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(Error::InvalidInput(format!("Unsafe storage key: {}", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageBackend for DiskBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
        _metadata: Option<&HashMap<String, String>>,
    ) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn get_signed_url(&self, key: &str, _options: &SignedUrlOptions) -> Result<String> {
        // Validate the key shape even though nothing touches the disk here.
        self.path_for(key)?;
        Ok(format!("{}/{}", self.base_url, key))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let src_path = self.path_for(src)?;
        let dst_path = self.path_for(dst)?;
        if let Some(parent) = dst_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src_path, &dst_path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_backend(root: &Path) -> DiskBackend {
        DiskBackend::new(
            "disk".to_string(),
            root.to_path_buf(),
            "http://localhost:8080/files".to_string(),
        )
    }

    #[tokio::test]
    async fn test_put_exists_copy_delete_roundtrip() {
        let dir = tempdir().unwrap();
        let backend = make_backend(dir.path());

        backend
            .put("shop.com/job-1/result/image.png", b"bytes", "image/png", None)
            .await
            .unwrap();
        assert!(backend.exists("shop.com/job-1/result/image.png").await.unwrap());
        assert!(!backend.exists("shop.com/missing.png").await.unwrap());

        backend
            .copy("shop.com/job-1/result/image.png", "shop.com/copy.png")
            .await
            .unwrap();
        assert!(backend.exists("shop.com/copy.png").await.unwrap());

        backend.delete("shop.com/copy.png").await.unwrap();
        assert!(!backend.exists("shop.com/copy.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_signed_url_is_public_base_url() {
        let dir = tempdir().unwrap();
        let backend = make_backend(dir.path());

        let url = backend
            .get_signed_url("shop.com/job-1/result/image.jpg", &SignedUrlOptions::default())
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:8080/files/shop.com/job-1/result/image.jpg");
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let dir = tempdir().unwrap();
        let backend = make_backend(dir.path());

        let err = backend
            .put("../outside.txt", b"x", "text/plain", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let backend = make_backend(dir.path());

        assert!(backend.delete("shop.com/nothing.png").await.is_err());
    }
}
