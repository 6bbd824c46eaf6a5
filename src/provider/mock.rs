use super::{ProviderJobStatus, ProviderStatus, ProviderSubmission, TryOnProvider};
use crate::models::{SubjectImage, TryOnModel};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Scripted provider for tests: submissions hand out sequential job ids and
/// status polls consume a queue of scripted responses (the last response
/// repeats once the queue drains).
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    fail_submit: Arc<Mutex<Option<String>>>,
    scripted_statuses: Arc<Mutex<VecDeque<ProviderJobStatus>>>,
    last_status: Arc<Mutex<Option<ProviderJobStatus>>>,
    submit_count: Arc<Mutex<usize>>,
    status_count: Arc<Mutex<usize>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            fail_submit: Arc::new(Mutex::new(None)),
            scripted_statuses: Arc::new(Mutex::new(VecDeque::new())),
            last_status: Arc::new(Mutex::new(None)),
            submit_count: Arc::new(Mutex::new(0)),
            status_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Makes every `submit` call fail with `PROVIDER_FAILED`.
    pub fn with_submit_failure(self, message: &str) -> Self {
        *self.fail_submit.lock().unwrap() = Some(message.to_string());
        self
    }

    /// Queues one scripted status poll response.
    pub fn with_status_response(self, status: ProviderStatus, result_url: Option<&str>) -> Self {
        self.scripted_statuses
            .lock()
            .unwrap()
            .push_back(ProviderJobStatus {
                status,
                result_url: result_url.map(|url| url.to_string()),
                error: None,
            });
        self
    }

    pub fn with_status_error(self, status: ProviderStatus, error: &str) -> Self {
        self.scripted_statuses
            .lock()
            .unwrap()
            .push_back(ProviderJobStatus {
                status,
                result_url: None,
                error: Some(error.to_string()),
            });
        self
    }

    pub fn get_submit_count(&self) -> usize {
        *self.submit_count.lock().unwrap()
    }

    pub fn get_status_count(&self) -> usize {
        *self.status_count.lock().unwrap()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TryOnProvider for MockProvider {
    async fn submit(
        &self,
        _model: TryOnModel,
        _product_image_url: &str,
        _subject_image: &SubjectImage,
        _params: Option<&serde_json::Value>,
    ) -> Result<ProviderSubmission> {
        let mut count = self.submit_count.lock().unwrap();
        *count += 1;

        if let Some(message) = self.fail_submit.lock().unwrap().clone() {
            return Err(Error::ProviderFailed(message));
        }

        Ok(ProviderSubmission {
            provider_job_id: format!("{}-job-{}", self.name, *count),
            provider_name: self.name.clone(),
            accepted_at: Utc::now(),
        })
    }

    async fn status(&self, _provider_job_id: &str) -> Result<ProviderJobStatus> {
        let mut count = self.status_count.lock().unwrap();
        *count += 1;

        if let Some(next) = self.scripted_statuses.lock().unwrap().pop_front() {
            *self.last_status.lock().unwrap() = Some(next.clone());
            return Ok(next);
        }

        if let Some(last) = self.last_status.lock().unwrap().clone() {
            return Ok(last);
        }

        Ok(ProviderJobStatus {
            status: ProviderStatus::Processing,
            result_url: None,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_sequential_job_ids() {
        let provider = MockProvider::new().with_name("vendor");
        let subject = SubjectImage::Url("https://example.com/p.jpg".to_string());

        let first = provider
            .submit(TryOnModel::Basic, "https://example.com/g.jpg", &subject, None)
            .await
            .unwrap();
        let second = provider
            .submit(TryOnModel::Basic, "https://example.com/g.jpg", &subject, None)
            .await
            .unwrap();

        assert_eq!(first.provider_job_id, "vendor-job-1");
        assert_eq!(second.provider_job_id, "vendor-job-2");
        assert_eq!(provider.get_submit_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_provider_scripted_statuses_then_repeat() {
        let provider = MockProvider::new()
            .with_status_response(ProviderStatus::Processing, None)
            .with_status_response(ProviderStatus::Completed, Some("https://cdn.test/x.png"));

        assert_eq!(
            provider.status("any").await.unwrap().status,
            ProviderStatus::Processing
        );
        assert_eq!(
            provider.status("any").await.unwrap().status,
            ProviderStatus::Completed
        );
        // Queue drained: the last response repeats.
        let repeated = provider.status("any").await.unwrap();
        assert_eq!(repeated.status, ProviderStatus::Completed);
        assert_eq!(repeated.result_url.as_deref(), Some("https://cdn.test/x.png"));
        assert_eq!(provider.get_status_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_provider_submit_failure() {
        let provider = MockProvider::new().with_submit_failure("no capacity");
        let subject = SubjectImage::Url("https://example.com/p.jpg".to_string());

        let err = provider
            .submit(TryOnModel::Basic, "https://example.com/g.jpg", &subject, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PROVIDER_FAILED");
    }
}
