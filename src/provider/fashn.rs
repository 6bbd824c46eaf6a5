use super::{ProviderJobStatus, ProviderStatus, ProviderSubmission, TryOnProvider};
use crate::models::{SubjectImage, TryOnModel};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.fashn.ai";
const PROVIDER_NAME: &str = "fashn";

#[derive(Debug, Serialize)]
struct RunRequest {
    model_name: String,
    inputs: RunInputs,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct RunInputs {
    model_image: String,
    garment_image: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    id: Option<String>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: Option<String>,
    output: Option<Vec<String>>,
    error: Option<serde_json::Value>,
}

/// Adapter for the FASHN virtual try-on API.
pub struct FashnClient {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl FashnClient {
    pub fn new(api_key: String) -> Self {
        Self::new_with_client(api_key, Client::new())
    }

    pub fn new_with_client(api_key: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// FASHN model identifier for our generic model enum.
    fn vendor_model(model: TryOnModel) -> &'static str {
        match model {
            TryOnModel::Basic => "tryon-v1.5",
            TryOnModel::Advanced => "tryon-v1.6",
        }
    }

    /// FASHN accepts either a fetchable URL or a base64 data URI for the
    /// subject image. Bare inline tokens get wrapped; malformed base64 is
    /// rejected before any network call.
    fn subject_image_payload(subject_image: &SubjectImage) -> Result<String> {
        match subject_image {
            SubjectImage::Url(url) => Ok(url.clone()),
            SubjectImage::Inline(data) => {
                if let Some(rest) = data.strip_prefix("data:") {
                    let b64 = rest.split_once("base64,").map(|(_, b64)| b64).ok_or_else(
                        || Error::InvalidInput("Inline image data URI is not base64".to_string()),
                    )?;
                    Self::validate_base64(b64)?;
                    Ok(data.clone())
                } else {
                    Self::validate_base64(data)?;
                    Ok(format!("data:image/jpeg;base64,{}", data))
                }
            }
        }
    }

    fn validate_base64(data: &str) -> Result<()> {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| Error::InvalidInput(format!("Invalid inline image base64: {}", e)))?;
        Ok(())
    }

    /// Normalizes FASHN's status vocabulary into the closed provider set.
    /// Anything unrecognized stays `Processing` so a vendor vocabulary
    /// change can never promote a job to a false terminal state.
    fn normalize_status(raw: &str) -> ProviderStatus {
        match raw {
            "starting" | "in_queue" => ProviderStatus::Queued,
            "processing" => ProviderStatus::Processing,
            "completed" => ProviderStatus::Completed,
            "failed" | "canceled" => ProviderStatus::Failed,
            other => {
                tracing::warn!(status = other, "Unrecognized FASHN status, treating as processing");
                ProviderStatus::Processing
            }
        }
    }

    fn format_vendor_error(error: &serde_json::Value) -> String {
        error
            .get("message")
            .and_then(|m| m.as_str())
            .map(|m| m.to_string())
            .unwrap_or_else(|| error.to_string())
    }
}

#[async_trait]
impl TryOnProvider for FashnClient {
    async fn submit(
        &self,
        model: TryOnModel,
        product_image_url: &str,
        subject_image: &SubjectImage,
        params: Option<&serde_json::Value>,
    ) -> Result<ProviderSubmission> {
        let request = RunRequest {
            model_name: Self::vendor_model(model).to_string(),
            inputs: RunInputs {
                model_image: Self::subject_image_payload(subject_image)?,
                garment_image: product_image_url.to_string(),
            },
            params: params.cloned(),
        };

        tracing::debug!(model = model.as_str(), "Submitting try-on job to FASHN");

        let response = self
            .client
            .post(format!("{}/v1/run", self.base_url))
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send submit request to FASHN: {}", e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("FASHN submit error (status {}): {}", status, error_text);
            return Err(Error::ProviderFailed(format!(
                "FASHN rejected submission (status {}): {}",
                status, error_text
            )));
        }

        let body: RunResponse = response.json().await.map_err(|e| {
            Error::ProviderFailed(format!("Unparseable FASHN submit response: {}", e))
        })?;

        if let Some(error) = &body.error {
            return Err(Error::ProviderFailed(format!(
                "FASHN rejected submission: {}",
                Self::format_vendor_error(error)
            )));
        }

        let provider_job_id = body.id.ok_or_else(|| {
            Error::ProviderFailed("FASHN submit response carried no job id".to_string())
        })?;

        Ok(ProviderSubmission {
            provider_job_id,
            provider_name: PROVIDER_NAME.to_string(),
            accepted_at: Utc::now(),
        })
    }

    async fn status(&self, provider_job_id: &str) -> Result<ProviderJobStatus> {
        let response = self
            .client
            .get(format!("{}/v1/status/{}", self.base_url, provider_job_id))
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to poll FASHN status: {}", e);
                e
            })?;

        // A vendor that no longer knows the job is expired, not failed -
        // the two are billed differently.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(ProviderJobStatus {
                status: ProviderStatus::Expired,
                result_url: None,
                error: Some(format!("FASHN no longer knows job {}", provider_job_id)),
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("FASHN status error (status {}): {}", status, error_text);
            return Err(Error::ProviderFailed(format!(
                "FASHN status poll failed (status {}): {}",
                status, error_text
            )));
        }

        let body: StatusResponse = response.json().await.map_err(|e| {
            Error::ProviderFailed(format!("Unparseable FASHN status response: {}", e))
        })?;

        let status = body
            .status
            .as_deref()
            .map(Self::normalize_status)
            .unwrap_or(ProviderStatus::Processing);

        let result_url = body
            .output
            .as_ref()
            .and_then(|urls| urls.first())
            .cloned();

        Ok(ProviderJobStatus {
            status,
            result_url,
            error: body.error.as_ref().map(Self::format_vendor_error),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_client(server: &MockServer) -> FashnClient {
        FashnClient::new("test-key".to_string()).with_base_url(server.uri())
    }

    fn subject_url() -> SubjectImage {
        SubjectImage::Url("https://example.com/person.jpg".to_string())
    }

    #[tokio::test]
    async fn test_submit_translates_model_and_returns_job_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/run"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_string_contains("\"model_name\":\"tryon-v1.6\""))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "fashn-123" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server);
        let submission = client
            .submit(
                TryOnModel::Advanced,
                "https://example.com/garment.jpg",
                &subject_url(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(submission.provider_job_id, "fashn-123");
        assert_eq!(submission.provider_name, "fashn");
    }

    #[tokio::test]
    async fn test_submit_rejection_is_provider_failed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/run"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad garment image"))
            .mount(&server)
            .await;

        let client = make_client(&server);
        let err = client
            .submit(
                TryOnModel::Basic,
                "https://example.com/garment.jpg",
                &subject_url(),
                None,
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), "PROVIDER_FAILED");
    }

    #[tokio::test]
    async fn test_submit_vendor_error_body_is_provider_failed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": { "name": "ImageLoadError", "message": "could not load model image" }
            })))
            .mount(&server)
            .await;

        let client = make_client(&server);
        let err = client
            .submit(
                TryOnModel::Basic,
                "https://example.com/garment.jpg",
                &subject_url(),
                None,
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("could not load model image"));
    }

    #[tokio::test]
    async fn test_status_completed_carries_result_url() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/status/fashn-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "fashn-123",
                "status": "completed",
                "output": ["https://cdn.fashn.ai/out/fashn-123.png"]
            })))
            .mount(&server)
            .await;

        let client = make_client(&server);
        let status = client.status("fashn-123").await.unwrap();

        assert_eq!(status.status, ProviderStatus::Completed);
        assert_eq!(
            status.result_url.as_deref(),
            Some("https://cdn.fashn.ai/out/fashn-123.png")
        );
    }

    #[tokio::test]
    async fn test_status_not_found_maps_to_expired() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/status/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let client = make_client(&server);
        let status = client.status("gone").await.unwrap();

        assert_eq!(status.status, ProviderStatus::Expired);
    }

    #[tokio::test]
    async fn test_status_unrecognized_vocabulary_stays_processing() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/status/fashn-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "fashn-123",
                "status": "warming_up_gpus"
            })))
            .mount(&server)
            .await;

        let client = make_client(&server);
        let status = client.status("fashn-123").await.unwrap();

        assert_eq!(status.status, ProviderStatus::Processing);
    }

    #[tokio::test]
    async fn test_status_failed_carries_vendor_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/status/fashn-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "fashn-123",
                "status": "failed",
                "error": { "name": "PipelineError", "message": "synthesis failed" }
            })))
            .mount(&server)
            .await;

        let client = make_client(&server);
        let status = client.status("fashn-123").await.unwrap();

        assert_eq!(status.status, ProviderStatus::Failed);
        assert_eq!(status.error.as_deref(), Some("synthesis failed"));
    }

    #[test]
    fn test_inline_subject_image_is_wrapped_as_data_uri() {
        use base64::Engine as _;
        let b64 = base64::engine::general_purpose::STANDARD.encode([0xFF, 0xD8, 0xFF]);
        let payload =
            FashnClient::subject_image_payload(&SubjectImage::Inline(b64.clone())).unwrap();
        assert_eq!(payload, format!("data:image/jpeg;base64,{}", b64));
    }

    #[test]
    fn test_inline_subject_image_rejects_bad_base64() {
        let err = FashnClient::subject_image_payload(&SubjectImage::Inline(
            "!!!not-base64!!!".to_string(),
        ))
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }
}
