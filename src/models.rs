//! Data models and structures
//!
//! Defines the core data structures for try-on jobs, credit ledger events,
//! request/response shapes, and runtime configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a try-on job.
///
/// `Completed`, `Failed`, and `ProviderExpired` are terminal; a job never
/// transitions again after reaching one of them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    ProviderExpired,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::ProviderExpired
        )
    }
}

/// Closed set of try-on models a caller may select. The provider registry
/// maps each variant to a registered provider name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TryOnModel {
    Basic,
    Advanced,
}

impl TryOnModel {
    pub const ALL: [TryOnModel; 2] = [TryOnModel::Basic, TryOnModel::Advanced];

    pub fn as_str(&self) -> &'static str {
        match self {
            TryOnModel::Basic => "basic",
            TryOnModel::Advanced => "advanced",
        }
    }
}

/// Reference to the subject's photo: exactly one of an image URL or an
/// inline (data/base64) reference. The content fingerprint is computed over
/// the reference string itself, never over image bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SubjectImage {
    Url(String),
    Inline(String),
}

impl SubjectImage {
    /// The string that gets fingerprinted and sent to the provider.
    pub fn reference(&self) -> &str {
        match self {
            SubjectImage::Url(url) => url,
            SubjectImage::Inline(data) => data,
        }
    }
}

/// A single try-on job record - the unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub tenant_id: String,
    pub shop_domain: String,
    pub product_id: String,
    pub visitor_id: String,
    pub customer_id: Option<String>,
    pub model: TryOnModel,
    pub status: JobStatus,
    pub provider_name: Option<String>,
    pub provider_job_id: Option<String>,
    pub result_url: Option<String>,
    /// SHA-256 hex digest of the subject-photo reference.
    pub user_image_hash: String,
    /// 0 or 1. Set to 1 exactly when the provider accepts the job, never
    /// decremented afterwards - a failed-but-accepted job still consumed a
    /// credit.
    pub credits_charged: u8,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Incoming try-on request, pre-validated by the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TryOnRequest {
    pub shop_domain: String,
    pub product_id: String,
    pub visitor_id: String,
    pub customer_id: Option<String>,
    pub model: TryOnModel,
    pub subject_image: SubjectImage,
    pub product_image_url: String,
    pub idempotency_key: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Response shape for `run_try_on` and idempotent replays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TryOnResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub result_url: Option<String>,
    /// Credits charged by this invocation (not the job's lifetime total).
    pub credits_charged: u8,
    pub cache_hit: bool,
}

/// Authenticated tenant identity resolved upstream of the gateway.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: String,
    pub shop_domain: String,
}

/// History listing filter. `shop_domain` is required; the rest narrow the
/// result set.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub shop_domain: String,
    pub visitor_id: Option<String>,
    pub product_id: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

/// One page of history results, ordered newest-first.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub items: Vec<Job>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Outcome of a cancellation request. Provider jobs cannot be cancelled, so
/// the gateway always reports `cancelled: false`.
#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub job_id: String,
    pub cancelled: bool,
    pub reason: String,
}

/// Immutable credit ledger event type. This core only appends `DebitTryon`
/// events; `Refund` exists for manual reconciliation by billing operators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CreditEventType {
    Topup,
    DebitTryon,
    Refund,
    Adjustment,
}

/// An append-only ledger entry. A tenant's available balance is the running
/// sum of its events' `credits` values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditEvent {
    pub tenant_id: String,
    pub event_type: CreditEventType,
    /// Signed credit amount (debits are negative).
    pub credits: i64,
    pub usd_amount: Option<f64>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub fashn_api_key: String,
    pub fashn_base_url: String,
    pub storage_access_key_id: Option<String>,
    pub storage_secret_access_key: Option<String>,
    pub storage_endpoint: String,
    pub storage_bucket: String,
    pub storage_public_base_url: String,
    pub storage_backend_order: Vec<String>,
    pub disk_storage_root: Option<String>,
    pub public_url_override: Option<String>,
    pub network_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            fashn_api_key: std::env::var("FASHN_API_KEY")
                .map_err(|_| crate::Error::Internal("FASHN_API_KEY not set".to_string()))?,
            fashn_base_url: std::env::var("FASHN_BASE_URL")
                .unwrap_or_else(|_| "https://api.fashn.ai".to_string()),
            storage_access_key_id: std::env::var("STORAGE_ACCESS_KEY_ID").ok(),
            storage_secret_access_key: std::env::var("STORAGE_SECRET_ACCESS_KEY").ok(),
            storage_endpoint: std::env::var("STORAGE_ENDPOINT")
                .unwrap_or_else(|_| "https://nyc3.digitaloceanspaces.com".to_string()),
            storage_bucket: std::env::var("STORAGE_BUCKET")
                .unwrap_or_else(|_| "tryon-results".to_string()),
            storage_public_base_url: std::env::var("STORAGE_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "https://cdn.tryon.example.com".to_string()),
            storage_backend_order: std::env::var("STORAGE_BACKEND_ORDER")
                .map(|raw| {
                    raw.split(',')
                        .map(|name| name.trim().to_string())
                        .filter(|name| !name.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            disk_storage_root: std::env::var("DISK_STORAGE_ROOT").ok(),
            public_url_override: std::env::var("PUBLIC_URL_OVERRIDE").ok(),
            network_timeout_secs: std::env::var("NETWORK_TIMEOUT_SECS")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(30),
        })
    }
}
