//! Try-on job orchestration: request lifecycle, credit metering, and the
//! caller-driven polling state machine.

use crate::fingerprint::fingerprint;
use crate::models::{
    CancelOutcome, CreditEvent, CreditEventType, HistoryPage, HistoryQuery, Job, JobStatus,
    TenantContext, TryOnRequest, TryOnResponse,
};
use crate::provider::{ProviderRegistry, ProviderStatus};
use crate::repo::{JobRepository, JobUpdate};
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 100;

/// Coordinates the job repository, credit ledger, and provider adapters for
/// the try-on request lifecycle. Holds no background scheduler: every
/// operation runs synchronously per inbound call.
pub struct TryOnGateway {
    repo: Arc<dyn JobRepository>,
    providers: ProviderRegistry,
}

impl TryOnGateway {
    pub fn new(repo: Arc<dyn JobRepository>, providers: ProviderRegistry) -> Self {
        Self { repo, providers }
    }

    /// Builds the gateway from environment configuration, registering the
    /// FASHN adapter for every model. Fails at startup when a model has no
    /// mapped, registered provider.
    pub fn from_config(config: &crate::models::Config, repo: Arc<dyn JobRepository>) -> Result<Self> {
        let fashn = crate::provider::FashnClient::new_with_client(
            config.fashn_api_key.clone(),
            reqwest::Client::new(),
        )
        .with_base_url(config.fashn_base_url.clone())
        .with_timeout(std::time::Duration::from_secs(config.network_timeout_secs));

        let providers = ProviderRegistry::new()
            .register("fashn", Arc::new(fashn))
            .map_model(crate::models::TryOnModel::Basic, "fashn")
            .map_model(crate::models::TryOnModel::Advanced, "fashn")
            .validate()?;

        Ok(Self::new(repo, providers))
    }

    /// Runs a try-on request end to end: authorization, idempotency and
    /// cache short-circuits, credit precheck, job creation, provider
    /// submission, and credit reservation.
    ///
    /// Credit reservation happens only after the provider has accepted the
    /// job, so a rejected submission never charges; callers needing
    /// exactly-once semantics under concurrent duplicates must supply an
    /// idempotency key.
    pub async fn run_try_on(
        &self,
        request: TryOnRequest,
        ctx: &TenantContext,
    ) -> Result<TryOnResponse> {
        // A valid API key used against another tenant's shop is still
        // unauthorized.
        if request.shop_domain != ctx.shop_domain {
            warn!(
                tenant_id = %ctx.tenant_id,
                requested_shop = %request.shop_domain,
                "Shop domain does not match authenticated tenant"
            );
            return Err(Error::Unauthorized(format!(
                "Shop domain {} does not belong to this tenant",
                request.shop_domain
            )));
        }

        let user_image_hash = fingerprint(request.subject_image.reference());

        // Idempotency first: an already-bound key replays the original job
        // without touching the provider or the ledger.
        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self.repo.find_job_by_idempotency(&ctx.tenant_id, key).await? {
                info!(job_id = %existing.id, idempotency_key = %key, "Idempotent replay");
                return Ok(TryOnResponse {
                    job_id: existing.id,
                    status: existing.status,
                    result_url: existing.result_url,
                    credits_charged: 0,
                    cache_hit: false,
                });
            }
        }

        // Cache second: a completed job for the same shop/product/subject
        // fingerprint satisfies the request without a new provider call.
        if let Some(cached) = self
            .repo
            .find_cached_result(&request.shop_domain, &request.product_id, &user_image_hash)
            .await?
        {
            info!(job_id = %cached.id, "Cache hit for try-on request");
            if let Some(key) = &request.idempotency_key {
                self.repo
                    .save_job_idempotency(&ctx.tenant_id, key, &cached.id)
                    .await?;
            }
            return Ok(TryOnResponse {
                job_id: cached.id,
                status: cached.status,
                result_url: cached.result_url,
                credits_charged: 0,
                cache_hit: true,
            });
        }

        // Fail fast before any mutation: no job row is created for a
        // tenant with an empty balance.
        if !self.repo.has_credits(&ctx.tenant_id).await? {
            warn!(tenant_id = %ctx.tenant_id, "Insufficient credits for try-on request");
            return Err(Error::InsufficientCredits(ctx.tenant_id.clone()));
        }

        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4().to_string(),
            tenant_id: ctx.tenant_id.clone(),
            shop_domain: request.shop_domain.clone(),
            product_id: request.product_id.clone(),
            visitor_id: request.visitor_id.clone(),
            customer_id: request.customer_id.clone(),
            model: request.model,
            status: JobStatus::Queued,
            provider_name: None,
            provider_job_id: None,
            result_url: None,
            user_image_hash,
            credits_charged: 0,
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        let job_id = job.id.clone();
        self.repo.create_job(job).await?;
        info!(job_id = %job_id, model = request.model.as_str(), "Created try-on job");

        // The registry is validated at startup, so a missing provider here
        // is a deployment problem. The job row stays behind for audit; no
        // credit is ever charged on this path.
        let Some((provider_name, provider)) = self.providers.resolve(request.model) else {
            let message = format!("No provider configured for model '{}'", request.model.as_str());
            self.mark_job_failed(&job_id, "PROVIDER_FAILED", &message)
                .await?;
            return Err(Error::ProviderFailed(message));
        };

        let submission = match provider
            .submit(
                request.model,
                &request.product_image_url,
                &request.subject_image,
                request.metadata.as_ref(),
            )
            .await
        {
            Ok(submission) => submission,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Provider submission failed");
                self.mark_job_failed(&job_id, e.code(), &e.to_string()).await?;
                return Err(e);
            }
        };

        // Reservation strictly follows provider acceptance so a rejected
        // submission cannot charge.
        self.repo.reserve_credit(&ctx.tenant_id, &job_id).await?;
        self.repo
            .record_credit_event(CreditEvent {
                tenant_id: ctx.tenant_id.clone(),
                event_type: CreditEventType::DebitTryon,
                credits: -1,
                usd_amount: None,
                metadata: Some(serde_json::json!({
                    "job_id": job_id,
                    "provider": submission.provider_name,
                    "provider_job_id": submission.provider_job_id,
                })),
                created_at: Utc::now(),
            })
            .await?;
        info!(job_id = %job_id, provider = %provider_name, "Reserved one credit");

        self.repo
            .update_job_status(
                &job_id,
                JobUpdate {
                    status: Some(JobStatus::Processing),
                    provider_name: Some(submission.provider_name.clone()),
                    provider_job_id: Some(submission.provider_job_id.clone()),
                    credits_charged: Some(1),
                    ..JobUpdate::default()
                },
            )
            .await?;

        if let Some(key) = &request.idempotency_key {
            self.repo
                .save_job_idempotency(&ctx.tenant_id, key, &job_id)
                .await?;
        }

        Ok(TryOnResponse {
            job_id,
            status: JobStatus::Processing,
            result_url: None,
            credits_charged: 1,
            cache_hit: false,
        })
    }

    /// Returns the job's current state, polling the provider when the job
    /// is still in flight. Terminal jobs and jobs that never reached the
    /// provider are returned unchanged without any provider call.
    pub async fn get_job_status(&self, job_id: &str, ctx: &TenantContext) -> Result<Option<Job>> {
        let Some(job) = self.repo.get_job(job_id).await? else {
            return Ok(None);
        };

        if job.shop_domain != ctx.shop_domain {
            return Err(Error::Unauthorized(format!(
                "Job {} does not belong to this shop",
                job_id
            )));
        }

        if job.status.is_terminal() {
            return Ok(Some(job));
        }
        let Some(provider_job_id) = job.provider_job_id.clone() else {
            return Ok(Some(job));
        };

        let Some((_, provider)) = self.providers.resolve(job.model) else {
            return Err(Error::ProviderFailed(format!(
                "No provider configured for model '{}'",
                job.model.as_str()
            )));
        };

        let poll = provider.status(&provider_job_id).await?;

        let update = match poll.status {
            ProviderStatus::Completed => {
                info!(job_id, "Provider reports completion");
                Some(JobUpdate {
                    status: Some(JobStatus::Completed),
                    result_url: poll.result_url,
                    ..JobUpdate::default()
                })
            }
            ProviderStatus::Failed => {
                warn!(job_id, error = ?poll.error, "Provider reports failure");
                Some(JobUpdate {
                    status: Some(JobStatus::Failed),
                    error_code: Some("PROVIDER_FAILED".to_string()),
                    error_message: poll.error.or_else(|| Some("Provider job failed".to_string())),
                    ..JobUpdate::default()
                })
            }
            ProviderStatus::Expired => {
                warn!(job_id, "Provider no longer knows the job");
                Some(JobUpdate {
                    status: Some(JobStatus::ProviderExpired),
                    error_code: Some("PROVIDER_TIMEOUT".to_string()),
                    error_message: poll
                        .error
                        .or_else(|| Some("Provider expired the job".to_string())),
                    ..JobUpdate::default()
                })
            }
            // Still in flight on the provider side: a no-op poll.
            ProviderStatus::Queued | ProviderStatus::Processing => None,
        };

        match update {
            Some(update) => Ok(Some(self.repo.update_job_status(job_id, update).await?)),
            None => Ok(Some(job)),
        }
    }

    /// Paginated job listing for a shop, newest first.
    pub async fn get_history(
        &self,
        mut query: HistoryQuery,
        ctx: &TenantContext,
    ) -> Result<HistoryPage> {
        if query.shop_domain != ctx.shop_domain {
            return Err(Error::Unauthorized(format!(
                "Shop domain {} does not belong to this tenant",
                query.shop_domain
            )));
        }

        if query.limit == 0 {
            query.limit = DEFAULT_HISTORY_LIMIT;
        }
        query.limit = query.limit.min(MAX_HISTORY_LIMIT);

        self.repo.get_history(&query).await
    }

    /// Provider jobs cannot be cancelled; the capability exists in the
    /// contract but always reports not-cancelled.
    pub async fn cancel_job(&self, job_id: &str, ctx: &TenantContext) -> Result<CancelOutcome> {
        let Some(job) = self.repo.get_job(job_id).await? else {
            return Err(Error::InvalidInput(format!("Unknown job: {}", job_id)));
        };
        if job.shop_domain != ctx.shop_domain {
            return Err(Error::Unauthorized(format!(
                "Job {} does not belong to this shop",
                job_id
            )));
        }

        Ok(CancelOutcome {
            job_id: job_id.to_string(),
            cancelled: false,
            reason: "Provider jobs cannot be cancelled".to_string(),
        })
    }

    async fn mark_job_failed(&self, job_id: &str, code: &str, message: &str) -> Result<()> {
        self.repo
            .update_job_status(
                job_id,
                JobUpdate {
                    status: Some(JobStatus::Failed),
                    error_code: Some(code.to_string()),
                    error_message: Some(message.to_string()),
                    ..JobUpdate::default()
                },
            )
            .await?;
        Ok(())
    }
}
