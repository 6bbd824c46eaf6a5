use super::{SignedUrlOptions, StorageBackend};
use crate::fingerprint::result_key;
use crate::{Error, Result};
use reqwest::Url;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{info, warn};

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Outcome of durably persisting a provider-hosted result.
#[derive(Debug, Clone)]
pub struct PersistedResult {
    pub key: String,
    pub result_url: String,
    pub content_type: String,
    pub size_bytes: usize,
}

/// One virtual backend over an ordered list of concrete backends.
///
/// Mutating and read operations try each backend strictly in configured
/// order and stop at the first success; only exhaustion of the whole chain
/// surfaces, as one aggregate error listing every underlying failure.
pub struct StorageGateway {
    backends: Vec<Arc<dyn StorageBackend>>,
    http: reqwest::Client,
    download_timeout: Duration,
    public_url_override: Option<Url>,
}

impl StorageGateway {
    /// The gateway always has at least one address space; an empty backend
    /// list is a configuration error.
    pub fn new(backends: Vec<Arc<dyn StorageBackend>>) -> Result<Self> {
        if backends.is_empty() {
            return Err(Error::Internal(
                "Storage gateway requires at least one backend".to_string(),
            ));
        }
        Ok(Self {
            backends,
            http: reqwest::Client::new(),
            download_timeout: Duration::from_secs(30),
            public_url_override: None,
        })
    }

    /// Composes the configured backends: an S3-compatible bucket when
    /// credentials are present, a disk backend when a root is set, ordered
    /// and override-wrapped per the config.
    pub async fn from_config(config: &crate::models::Config) -> Result<Self> {
        let mut backends: Vec<Arc<dyn StorageBackend>> = Vec::new();

        if let (Some(access_key_id), Some(secret_access_key)) = (
            config.storage_access_key_id.clone(),
            config.storage_secret_access_key.clone(),
        ) {
            backends.push(Arc::new(
                super::S3Backend::new(
                    "spaces".to_string(),
                    access_key_id,
                    secret_access_key,
                    config.storage_endpoint.clone(),
                    config.storage_bucket.clone(),
                )
                .await?,
            ));
        }

        if let Some(root) = &config.disk_storage_root {
            backends.push(Arc::new(super::DiskBackend::new(
                "disk".to_string(),
                root.into(),
                config.storage_public_base_url.clone(),
            )));
        }

        let mut gateway = Self::new(backends)?
            .with_backend_order(&config.storage_backend_order)
            .with_download_timeout(Duration::from_secs(config.network_timeout_secs));

        if let Some(override_base) = &config.public_url_override {
            gateway = gateway.with_public_url_override(override_base)?;
        }

        Ok(gateway)
    }

    /// Reorders backends to match the configured name list. Names that
    /// match no registered backend are dropped with a warning; registered
    /// backends missing from the list are appended at the end.
    pub fn with_backend_order(mut self, order: &[String]) -> Self {
        let mut remaining = self.backends;
        let mut ordered: Vec<Arc<dyn StorageBackend>> = Vec::with_capacity(remaining.len());

        for name in order {
            match remaining.iter().position(|b| b.name() == name) {
                Some(index) => ordered.push(remaining.remove(index)),
                None => {
                    warn!(backend = %name, "Configured storage backend is not registered, dropping")
                }
            }
        }
        for backend in remaining {
            info!(backend = backend.name(), "Backend not in order list, appending at end");
            ordered.push(backend);
        }

        self.backends = ordered;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Routes `persist_try_on_result` URLs through a public tunnel/proxy:
    /// only scheme, host, and port of the final URL are rewritten; path and
    /// query are preserved. Never applied to plain `get_signed_url` calls.
    pub fn with_public_url_override(mut self, base: &str) -> Result<Self> {
        let parsed = Url::parse(base)
            .map_err(|e| Error::InvalidInput(format!("Invalid public URL override: {}", e)))?;
        if parsed.host_str().is_none() {
            return Err(Error::InvalidInput(format!(
                "Public URL override has no host: {}",
                base
            )));
        }
        self.public_url_override = Some(parsed);
        Ok(self)
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Sequential-iteration combinator: runs `f` against each backend in
    /// order, returning the first success and collecting every failure
    /// along the way. The closure's futures borrow from the surrounding
    /// call, so the backend borrow is tied to `&'s self` rather than
    /// universally quantified.
    async fn try_each<'s, T, F>(&'s self, operation: &str, f: F) -> Result<T>
    where
        F: Fn(&'s dyn StorageBackend) -> BackendFuture<'s, T>,
    {
        let mut failures: Vec<(String, String)> = Vec::new();

        for backend in &self.backends {
            match f(backend.as_ref()).await {
                Ok(value) => {
                    if !failures.is_empty() {
                        info!(
                            operation,
                            backend = backend.name(),
                            failed = failures.len(),
                            "Storage operation succeeded after fallback"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!(
                        operation,
                        backend = backend.name(),
                        error = %e,
                        "Storage backend failed, trying next"
                    );
                    failures.push((backend.name().to_string(), e.to_string()));
                }
            }
        }

        Err(Error::StorageFailed(failures))
    }

    fn apply_public_url_override(&self, url: &str) -> Result<String> {
        let Some(override_base) = &self.public_url_override else {
            return Ok(url.to_string());
        };

        let mut rewritten = Url::parse(url)
            .map_err(|e| Error::Internal(format!("Unparseable result URL {}: {}", url, e)))?;
        rewritten
            .set_scheme(override_base.scheme())
            .map_err(|_| Error::Internal(format!("Cannot rewrite scheme of {}", url)))?;
        rewritten
            .set_host(override_base.host_str())
            .map_err(|e| Error::Internal(format!("Cannot rewrite host of {}: {}", url, e)))?;
        rewritten
            .set_port(override_base.port())
            .map_err(|_| Error::Internal(format!("Cannot rewrite port of {}", url)))?;

        Ok(rewritten.to_string())
    }

    async fn download_result(&self, provider_result_url: &str) -> Result<(Vec<u8>, String)> {
        // Provider-hosted result URLs are transient; a couple of quick
        // retries covers momentary CDN hiccups without masking real
        // failures.
        let retry_strategy = FixedInterval::from_millis(500).take(3);

        Retry::spawn(retry_strategy, || async {
            let response = self
                .http
                .get(provider_result_url)
                .timeout(self.download_timeout)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                warn!(url = provider_result_url, %status, "Result download failed");
                return Err(Error::Internal(format!(
                    "Result download failed (status {}): {}",
                    status, provider_result_url
                )));
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string();

            // Fully materialized: a failed put against backend N must be
            // retryable against backend N+1 with the identical payload.
            let bytes = response.bytes().await?.to_vec();
            Ok((bytes, content_type))
        })
        .await
    }

    /// Downloads the provider's (time-limited) result and writes it under
    /// the deterministic key `{sanitized-shop}/{job_id}/result/image.{ext}`,
    /// returning a durable URL for the stored copy.
    pub async fn persist_try_on_result(
        &self,
        job_id: &str,
        shop_domain: &str,
        provider_result_url: &str,
        provider_name: Option<&str>,
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<PersistedResult> {
        let (bytes, content_type) = self.download_result(provider_result_url).await?;
        let key = result_key(shop_domain, job_id, &content_type);

        let mut object_metadata: HashMap<String, String> = metadata.cloned().unwrap_or_default();
        object_metadata.insert("job-id".to_string(), job_id.to_string());
        if let Some(provider) = provider_name {
            object_metadata.insert("provider".to_string(), provider.to_string());
        }

        self.put(&key, &bytes, &content_type, Some(&object_metadata))
            .await?;

        let stored_url = self.get_signed_url(&key, &SignedUrlOptions::default()).await?;
        let result_url = self.apply_public_url_override(&stored_url)?;

        info!(
            job_id,
            key,
            content_type,
            size_bytes = bytes.len(),
            "Persisted try-on result"
        );

        Ok(PersistedResult {
            key,
            result_url,
            content_type,
            size_bytes: bytes.len(),
        })
    }

    pub async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<()> {
        self.try_each("put", |backend: &dyn StorageBackend| {
            Box::pin(async move { backend.put(key, bytes, content_type, metadata).await })
        })
        .await
    }

    pub async fn get_signed_url(&self, key: &str, options: &SignedUrlOptions) -> Result<String> {
        self.try_each("get_signed_url", |backend: &dyn StorageBackend| {
            Box::pin(async move { backend.get_signed_url(key, options).await })
        })
        .await
    }

    /// Ordered existence check. A backend answering "not found" made a
    /// successful check; only a throwing backend counts toward exhaustion.
    /// Returns `true` as soon as any backend confirms presence.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut failures: Vec<(String, String)> = Vec::new();
        let mut confirmed_absent = false;

        for backend in &self.backends {
            match backend.exists(key).await {
                Ok(true) => return Ok(true),
                Ok(false) => confirmed_absent = true,
                Err(e) => {
                    warn!(
                        backend = backend.name(),
                        key,
                        error = %e,
                        "Existence check failed, trying next backend"
                    );
                    failures.push((backend.name().to_string(), e.to_string()));
                }
            }
        }

        if confirmed_absent {
            Ok(false)
        } else {
            Err(Error::StorageFailed(failures))
        }
    }

    pub async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        self.try_each("copy", |backend: &dyn StorageBackend| {
            Box::pin(async move { backend.copy(src, dst).await })
        })
        .await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.try_each("delete", |backend: &dyn StorageBackend| {
            Box::pin(async move { backend.delete(key).await })
        })
        .await
    }
}
