//! Object storage backends and the ordered-fallback gateway.
//!
//! Each concrete backend (S3-compatible bucket, local disk) implements the
//! same capability set; the fallback gateway composes them into one virtual
//! backend that masks individual backend outages from callers.

pub mod disk;
pub mod fallback;
pub mod mock;
pub mod s3;

pub use disk::DiskBackend;
pub use fallback::{PersistedResult, StorageGateway};
pub use mock::MockBackend;
pub use s3::S3Backend;

use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// HTTP method a signed URL grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedUrlMethod {
    Get,
    Put,
}

#[derive(Debug, Clone)]
pub struct SignedUrlOptions {
    pub expires_in: Duration,
    pub method: SignedUrlMethod,
}

impl Default for SignedUrlOptions {
    fn default() -> Self {
        Self {
            expires_in: Duration::from_secs(3600),
            method: SignedUrlMethod::Get,
        }
    }
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Stable backend name used by the fallback order list and aggregate
    /// errors.
    fn name(&self) -> &str;

    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<()>;

    /// Durable URL for a stored object (presigned where the backend signs,
    /// public otherwise).
    async fn get_signed_url(&self, key: &str, options: &SignedUrlOptions) -> Result<String>;

    /// `Ok(false)` is a successful negative answer, distinct from the
    /// check itself failing.
    async fn exists(&self, key: &str) -> Result<bool>;

    async fn copy(&self, src: &str, dst: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}
