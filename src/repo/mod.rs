//! Job repository collaborator contract.
//!
//! Persistence of job records, idempotency keys, cache lookups, and the
//! per-tenant credit ledger lives behind this trait. Transactional
//! guarantees (and at least read-your-writes consistency per tenant) are
//! owned by the implementing collaborator, not by this core.

pub mod memory;

pub use memory::InMemoryJobRepository;

use crate::models::{CreditEvent, HistoryPage, HistoryQuery, Job, JobStatus, TenantContext};
use crate::Result;
use async_trait::async_trait;

/// Partial update applied to a job record. `None` fields are left
/// untouched, so a terminal transition is a single call.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub provider_name: Option<String>,
    pub provider_job_id: Option<String>,
    pub result_url: Option<String>,
    pub credits_charged: Option<u8>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Resolves an API key to its tenant, or `None` for unknown keys.
    async fn validate_api_key(&self, api_key: &str) -> Result<Option<TenantContext>>;

    /// Whether the tenant has at least one available credit.
    async fn has_credits(&self, tenant_id: &str) -> Result<bool>;

    /// Transactionally decrements one credit from the tenant's balance.
    async fn reserve_credit(&self, tenant_id: &str, job_id: &str) -> Result<()>;

    /// Appends an immutable ledger event. Events are never mutated or
    /// deleted.
    async fn record_credit_event(&self, event: CreditEvent) -> Result<()>;

    /// Newest completed job with a result URL for
    /// `(shop_domain, product_id, user_image_hash)`, if any.
    async fn find_cached_result(
        &self,
        shop_domain: &str,
        product_id: &str,
        user_image_hash: &str,
    ) -> Result<Option<Job>>;

    /// Job previously bound to `(tenant_id, idempotency_key)`, if any.
    async fn find_job_by_idempotency(
        &self,
        tenant_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<Job>>;

    /// Binds `(tenant_id, idempotency_key)` to a job id. First binding
    /// wins; rebinding an existing key is a no-op.
    async fn save_job_idempotency(
        &self,
        tenant_id: &str,
        idempotency_key: &str,
        job_id: &str,
    ) -> Result<()>;

    async fn create_job(&self, job: Job) -> Result<()>;

    /// Applies a partial update and returns the updated record.
    async fn update_job_status(&self, job_id: &str, update: JobUpdate) -> Result<Job>;

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>>;

    /// Paginated listing filtered per the query, newest-first.
    async fn get_history(&self, query: &HistoryQuery) -> Result<HistoryPage>;
}
