//! Provider adapters for external try-on image synthesis vendors.
//!
//! Each vendor is wrapped behind a uniform submit/poll contract that hides
//! payload shapes and normalizes status vocabulary into a closed set.

pub mod fashn;
pub mod mock;

pub use fashn::FashnClient;
pub use mock::MockProvider;

use crate::models::{SubjectImage, TryOnModel};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Normalized provider-side job status. Unrecognized vendor statuses must
/// map to `Processing` (never invent a false terminal state); a vendor
/// "not found" must map to `Expired`, not `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Expired,
}

/// Result of a successful provider submission.
#[derive(Debug, Clone)]
pub struct ProviderSubmission {
    pub provider_job_id: String,
    pub provider_name: String,
    pub accepted_at: DateTime<Utc>,
}

/// Normalized poll response.
#[derive(Debug, Clone)]
pub struct ProviderJobStatus {
    pub status: ProviderStatus,
    pub result_url: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait TryOnProvider: Send + Sync {
    /// Submit a try-on job, translating the generic model enum into the
    /// vendor's own model identifier and payload shape.
    async fn submit(
        &self,
        model: TryOnModel,
        product_image_url: &str,
        subject_image: &SubjectImage,
        params: Option<&serde_json::Value>,
    ) -> Result<ProviderSubmission>;

    /// Poll a previously submitted job by the vendor's job id.
    async fn status(&self, provider_job_id: &str) -> Result<ProviderJobStatus>;
}

/// Registry of named providers plus the model -> provider-name lookup
/// table. Resolved once at startup; [`ProviderRegistry::validate`] rejects
/// configurations where a model has no mapped, registered provider rather
/// than failing lazily per request.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn TryOnProvider>>,
    model_providers: HashMap<TryOnModel, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: &str, provider: Arc<dyn TryOnProvider>) -> Self {
        self.providers.insert(name.to_string(), provider);
        self
    }

    pub fn map_model(mut self, model: TryOnModel, provider_name: &str) -> Self {
        self.model_providers
            .insert(model, provider_name.to_string());
        self
    }

    /// Fails unless every model in the closed enum maps to a registered
    /// provider. Call once at startup.
    pub fn validate(self) -> Result<Self> {
        for model in TryOnModel::ALL {
            let name = self.model_providers.get(&model).ok_or_else(|| {
                Error::ProviderFailed(format!("No provider mapped for model '{}'", model.as_str()))
            })?;
            if !self.providers.contains_key(name) {
                return Err(Error::ProviderFailed(format!(
                    "Model '{}' maps to unregistered provider '{}'",
                    model.as_str(),
                    name
                )));
            }
            info!(model = model.as_str(), provider = %name, "Provider mapping validated");
        }
        Ok(self)
    }

    /// Resolve the provider for a model, or `None` when unmapped or the
    /// mapped name is not registered.
    pub fn resolve(&self, model: TryOnModel) -> Option<(&str, Arc<dyn TryOnProvider>)> {
        let name = self.model_providers.get(&model)?;
        let provider = self.providers.get(name)?;
        Some((name.as_str(), Arc::clone(provider)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;

    #[test]
    fn test_registry_validates_complete_mapping() {
        let registry = ProviderRegistry::new()
            .register("fashn", Arc::new(MockProvider::new()))
            .map_model(TryOnModel::Basic, "fashn")
            .map_model(TryOnModel::Advanced, "fashn")
            .validate();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_registry_rejects_unmapped_model() {
        let registry = ProviderRegistry::new()
            .register("fashn", Arc::new(MockProvider::new()))
            .map_model(TryOnModel::Basic, "fashn")
            .validate();
        let err = registry.err().unwrap();
        assert_eq!(err.code(), "PROVIDER_FAILED");
        assert!(err.to_string().contains("advanced"));
    }

    #[test]
    fn test_registry_rejects_unregistered_provider_name() {
        let registry = ProviderRegistry::new()
            .register("fashn", Arc::new(MockProvider::new()))
            .map_model(TryOnModel::Basic, "fashn")
            .map_model(TryOnModel::Advanced, "replicant")
            .validate();
        let err = registry.err().unwrap();
        assert!(err.to_string().contains("replicant"));
    }

    #[test]
    fn test_registry_resolve_returns_name_and_provider() {
        let registry = ProviderRegistry::new()
            .register("fashn", Arc::new(MockProvider::new()))
            .map_model(TryOnModel::Basic, "fashn")
            .map_model(TryOnModel::Advanced, "fashn")
            .validate()
            .unwrap();

        let (name, _provider) = registry.resolve(TryOnModel::Advanced).unwrap();
        assert_eq!(name, "fashn");
    }
}
