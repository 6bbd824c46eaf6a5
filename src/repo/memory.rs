use super::{JobRepository, JobUpdate};
use crate::models::{
    CreditEvent, CreditEventType, HistoryPage, HistoryQuery, Job, TenantContext,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    api_keys: HashMap<String, TenantContext>,
    /// Explicit balances; `reserve_credit` decrements here while the event
    /// log below stays append-only audit data.
    balances: HashMap<String, i64>,
    events: Vec<CreditEvent>,
    jobs: HashMap<String, Job>,
    /// Creation order, newest last. Used for newest-first listings.
    job_order: Vec<String>,
    idempotency: HashMap<(String, String), String>,
}

/// In-memory repository used by the test suite and local harnesses.
/// Balances and the ledger are seeded through the `with_tenant` builder.
#[derive(Clone, Default)]
pub struct InMemoryJobRepository {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a tenant: API key mapping, starting balance, and the matching
    /// topup ledger event.
    pub fn with_tenant(
        self,
        api_key: &str,
        tenant_id: &str,
        shop_domain: &str,
        credits: i64,
    ) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.api_keys.insert(
                api_key.to_string(),
                TenantContext {
                    tenant_id: tenant_id.to_string(),
                    shop_domain: shop_domain.to_string(),
                },
            );
            inner.balances.insert(tenant_id.to_string(), credits);
            if credits > 0 {
                inner.events.push(CreditEvent {
                    tenant_id: tenant_id.to_string(),
                    event_type: CreditEventType::Topup,
                    credits,
                    usd_amount: None,
                    metadata: None,
                    created_at: Utc::now(),
                });
            }
        }
        self
    }

    pub fn credit_balance(&self, tenant_id: &str) -> i64 {
        self.inner
            .lock()
            .unwrap()
            .balances
            .get(tenant_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn get_events(&self) -> Vec<CreditEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn job_count(&self) -> usize {
        self.inner.lock().unwrap().jobs.len()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn validate_api_key(&self, api_key: &str) -> Result<Option<TenantContext>> {
        Ok(self.inner.lock().unwrap().api_keys.get(api_key).cloned())
    }

    async fn has_credits(&self, tenant_id: &str) -> Result<bool> {
        Ok(self.credit_balance(tenant_id) > 0)
    }

    async fn reserve_credit(&self, tenant_id: &str, job_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let balance = inner.balances.entry(tenant_id.to_string()).or_insert(0);
        if *balance <= 0 {
            return Err(Error::InsufficientCredits(tenant_id.to_string()));
        }
        *balance -= 1;
        tracing::debug!(tenant_id, job_id, balance = *balance, "Reserved credit");
        Ok(())
    }

    async fn record_credit_event(&self, event: CreditEvent) -> Result<()> {
        self.inner.lock().unwrap().events.push(event);
        Ok(())
    }

    async fn find_cached_result(
        &self,
        shop_domain: &str,
        product_id: &str,
        user_image_hash: &str,
    ) -> Result<Option<Job>> {
        let inner = self.inner.lock().unwrap();
        let found = inner
            .job_order
            .iter()
            .rev()
            .filter_map(|id| inner.jobs.get(id))
            .find(|job| {
                job.shop_domain == shop_domain
                    && job.product_id == product_id
                    && job.user_image_hash == user_image_hash
                    && job.status == crate::models::JobStatus::Completed
                    && job.result_url.is_some()
            });
        Ok(found.cloned())
    }

    async fn find_job_by_idempotency(
        &self,
        tenant_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<Job>> {
        let inner = self.inner.lock().unwrap();
        let job_id = inner
            .idempotency
            .get(&(tenant_id.to_string(), idempotency_key.to_string()));
        Ok(job_id.and_then(|id| inner.jobs.get(id)).cloned())
    }

    async fn save_job_idempotency(
        &self,
        tenant_id: &str,
        idempotency_key: &str,
        job_id: &str,
    ) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .idempotency
            .entry((tenant_id.to_string(), idempotency_key.to_string()))
            .or_insert_with(|| job_id.to_string());
        Ok(())
    }

    async fn create_job(&self, job: Job) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.job_order.push(job.id.clone());
        inner.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn update_job_status(&self, job_id: &str, update: JobUpdate) -> Result<Job> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::Internal(format!("Unknown job: {}", job_id)))?;

        if let Some(status) = update.status {
            job.status = status;
        }
        if let Some(provider_name) = update.provider_name {
            job.provider_name = Some(provider_name);
        }
        if let Some(provider_job_id) = update.provider_job_id {
            job.provider_job_id = Some(provider_job_id);
        }
        if let Some(result_url) = update.result_url {
            job.result_url = Some(result_url);
        }
        if let Some(credits_charged) = update.credits_charged {
            job.credits_charged = credits_charged;
        }
        if let Some(error_code) = update.error_code {
            job.error_code = Some(error_code);
        }
        if let Some(error_message) = update.error_message {
            job.error_message = Some(error_message);
        }
        job.updated_at = Utc::now();

        Ok(job.clone())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        Ok(self.inner.lock().unwrap().jobs.get(job_id).cloned())
    }

    async fn get_history(&self, query: &HistoryQuery) -> Result<HistoryPage> {
        let inner = self.inner.lock().unwrap();
        let matching: Vec<&Job> = inner
            .job_order
            .iter()
            .rev()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|job| job.shop_domain == query.shop_domain)
            .filter(|job| {
                query
                    .visitor_id
                    .as_ref()
                    .map_or(true, |visitor| &job.visitor_id == visitor)
            })
            .filter(|job| {
                query
                    .product_id
                    .as_ref()
                    .map_or(true, |product| &job.product_id == product)
            })
            .collect();

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();

        Ok(HistoryPage {
            items,
            total,
            limit: query.limit,
            offset: query.offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobStatus, SubjectImage, TryOnModel};

    fn make_job(id: &str, shop: &str, product: &str, hash: &str) -> Job {
        let now = Utc::now();
        Job {
            id: id.to_string(),
            tenant_id: "tenant-1".to_string(),
            shop_domain: shop.to_string(),
            product_id: product.to_string(),
            visitor_id: "visitor-1".to_string(),
            customer_id: None,
            model: TryOnModel::Basic,
            status: JobStatus::Queued,
            provider_name: None,
            provider_job_id: None,
            result_url: None,
            user_image_hash: hash.to_string(),
            credits_charged: 0,
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_validate_api_key() {
        let repo = InMemoryJobRepository::new().with_tenant("key-1", "tenant-1", "shop.com", 5);

        let ctx = repo.validate_api_key("key-1").await.unwrap().unwrap();
        assert_eq!(ctx.tenant_id, "tenant-1");
        assert_eq!(ctx.shop_domain, "shop.com");

        assert!(repo.validate_api_key("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reserve_credit_decrements_and_bottoms_out() {
        let repo = InMemoryJobRepository::new().with_tenant("key-1", "tenant-1", "shop.com", 1);

        assert!(repo.has_credits("tenant-1").await.unwrap());
        repo.reserve_credit("tenant-1", "job-1").await.unwrap();
        assert_eq!(repo.credit_balance("tenant-1"), 0);
        assert!(!repo.has_credits("tenant-1").await.unwrap());

        let err = repo.reserve_credit("tenant-1", "job-2").await.unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_CREDITS");
    }

    #[tokio::test]
    async fn test_cache_lookup_requires_completed_with_result_url() {
        let repo = InMemoryJobRepository::new();
        repo.create_job(make_job("job-1", "shop.com", "product-1", "hash-1"))
            .await
            .unwrap();

        // Queued job is not cache-eligible.
        assert!(repo
            .find_cached_result("shop.com", "product-1", "hash-1")
            .await
            .unwrap()
            .is_none());

        repo.update_job_status(
            "job-1",
            JobUpdate {
                status: Some(JobStatus::Completed),
                result_url: Some("https://cdn.test/result.png".to_string()),
                ..JobUpdate::default()
            },
        )
        .await
        .unwrap();

        let cached = repo
            .find_cached_result("shop.com", "product-1", "hash-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.id, "job-1");

        // Fingerprint mismatch misses.
        assert!(repo
            .find_cached_result("shop.com", "product-1", "hash-2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_idempotency_first_binding_wins() {
        let repo = InMemoryJobRepository::new();
        repo.create_job(make_job("job-1", "shop.com", "p", "h"))
            .await
            .unwrap();
        repo.create_job(make_job("job-2", "shop.com", "p", "h"))
            .await
            .unwrap();

        repo.save_job_idempotency("tenant-1", "idem-1", "job-1")
            .await
            .unwrap();
        repo.save_job_idempotency("tenant-1", "idem-1", "job-2")
            .await
            .unwrap();

        let bound = repo
            .find_job_by_idempotency("tenant-1", "idem-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bound.id, "job-1");

        // Same key under a different tenant is unbound.
        assert!(repo
            .find_job_by_idempotency("tenant-2", "idem-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_history_filters_and_paginates_newest_first() {
        let repo = InMemoryJobRepository::new();
        for i in 0..5 {
            repo.create_job(make_job(
                &format!("job-{}", i),
                "shop.com",
                if i % 2 == 0 { "product-a" } else { "product-b" },
                "hash",
            ))
            .await
            .unwrap();
        }
        repo.create_job(make_job("job-other", "other.com", "product-a", "hash"))
            .await
            .unwrap();

        let page = repo
            .get_history(&HistoryQuery {
                shop_domain: "shop.com".to_string(),
                product_id: Some("product-a".to_string()),
                limit: 2,
                offset: 0,
                ..HistoryQuery::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        // Newest first.
        assert_eq!(page.items[0].id, "job-4");
        assert_eq!(page.items[1].id, "job-2");

        let next = repo
            .get_history(&HistoryQuery {
                shop_domain: "shop.com".to_string(),
                product_id: Some("product-a".to_string()),
                limit: 2,
                offset: 2,
                ..HistoryQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(next.items.len(), 1);
        assert_eq!(next.items[0].id, "job-0");
    }
}
