use super::{SignedUrlMethod, SignedUrlOptions, StorageBackend};
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::Region, Client as S3Client};
use std::collections::HashMap;

/// S3-compatible backend (AWS S3, DigitalOcean Spaces, MinIO).
pub struct S3Backend {
    name: String,
    client: S3Client,
    bucket: String,
}

impl S3Backend {
    pub async fn new(
        name: String,
        access_key_id: String,
        secret_access_key: String,
        endpoint: String,
        bucket: String,
    ) -> Result<Self> {
        let credentials = aws_sdk_s3::config::Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "tryon-gateway",
        );

        // S3-compatible stores mostly ignore the region but the SDK
        // requires one.
        let config = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .load()
            .await;

        let client = S3Client::new(&config);

        Ok(Self {
            name,
            client,
            bucket,
        })
    }

    fn presigning_config(options: &SignedUrlOptions) -> Result<PresigningConfig> {
        PresigningConfig::expires_in(options.expires_in)
            .map_err(|e| Error::Internal(format!("Invalid presign expiry: {}", e)))
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(content_type);

        if let Some(metadata) = metadata {
            for (meta_key, meta_value) in metadata {
                request = request.metadata(meta_key, meta_value);
            }
        }

        request
            .send()
            .await
            .map_err(|e| Error::Internal(format!("S3 put failed for {}: {}", key, e)))?;

        Ok(())
    }

    async fn get_signed_url(&self, key: &str, options: &SignedUrlOptions) -> Result<String> {
        let presigning = Self::presigning_config(options)?;

        let presigned = match options.method {
            SignedUrlMethod::Get => self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .presigned(presigning)
                .await
                .map_err(|e| Error::Internal(format!("S3 presign failed for {}: {}", key, e)))?,
            SignedUrlMethod::Put => self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .presigned(presigning)
                .await
                .map_err(|e| Error::Internal(format!("S3 presign failed for {}: {}", key, e)))?,
        };

        Ok(presigned.uri().to_string())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                // A missing object is a valid negative answer; anything
                // else is a failed check.
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(Error::Internal(format!(
                        "S3 head failed for {}: {}",
                        key, service_err
                    )))
                }
            }
        }
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, src))
            .key(dst)
            .send()
            .await
            .map_err(|e| {
                Error::Internal(format!("S3 copy failed for {} -> {}: {}", src, dst, e))
            })?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("S3 delete failed for {}: {}", key, e)))?;
        Ok(())
    }
}
