//! Review orchestration: rate limits, duplicate policy, provider
//! fan-out, and row lifecycle.
//!
//! The orchestrator is the sole boundary converting component failures
//! into the public error taxonomy, and it always resolves a pending
//! row to a terminal state before propagating an error. Quota and
//! duplicate checks run before any provider is contacted.

use super::consensus;
use super::normalize::normalize;
use super::prompt::{build_prompt, SubmissionContext};
use super::types::{ConsensusResult, ProviderIdentity, ReviewRequest, ReviewResult, ReviewStatus};
use crate::error::{ProviderError, ProviderErrorKind, ReviewError};
use crate::providers::{ProviderGateway, ProviderRegistry, PROVIDER_TIMEOUT};
use crate::store::{ReviewStore, StoreError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Rolling one-hour window for both quotas.
const QUOTA_WINDOW: Duration = Duration::from_secs(3600);

/// Rolling-window quotas per principal.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub submissions_per_hour: u64,
    pub reviews_per_hour: u64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            submissions_per_hour: 5,
            reviews_per_hour: 10,
        }
    }
}

impl From<StoreError> for ReviewError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey => ReviewError::DuplicateReview,
            StoreError::Other(e) => ReviewError::Store(e.to_string()),
        }
    }
}

/// Cheaply cloneable so provider fan-out can spawn owned tasks.
#[derive(Clone)]
pub struct ReviewOrchestrator {
    store: Arc<dyn ReviewStore>,
    providers: ProviderRegistry,
    limits: RateLimits,
    provider_timeout: Duration,
}

impl ReviewOrchestrator {
    pub fn new(store: Arc<dyn ReviewStore>, providers: ProviderRegistry, limits: RateLimits) -> Self {
        Self {
            store,
            providers,
            limits,
            provider_timeout: PROVIDER_TIMEOUT,
        }
    }

    pub fn store(&self) -> &Arc<dyn ReviewStore> {
        &self.store
    }

    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Generate one review through exactly one provider.
    ///
    /// Quota and duplicate checks happen before any gateway contact;
    /// once a pending row exists, every exit path resolves it to
    /// `Completed` or `Failed`.
    pub async fn request_review(
        &self,
        request: &ReviewRequest,
        author: &str,
        deadline: Option<Instant>,
    ) -> Result<ReviewResult, ReviewError> {
        let submission = self
            .store
            .get_submission(request.submission_id)?
            .ok_or(ReviewError::SubmissionNotFound)?;

        let recent = self
            .store
            .count_recent_reviews(author, window_start())?;
        if recent >= self.limits.reviews_per_hour {
            return Err(ReviewError::RateLimitExceeded(format!(
                "review quota reached ({}/hour)",
                self.limits.reviews_per_hour
            )));
        }

        if let Some(row) = self.store.find_by_tuple(
            request.submission_id,
            request.review_type,
            request.personality,
            &request.model,
        )? {
            if row.status != ReviewStatus::Failed {
                return Err(ReviewError::DuplicateReview);
            }
        }

        let gateway = self
            .providers
            .get(&request.model)
            .ok_or_else(|| ReviewError::InvalidRequest(format!("unknown model '{}'", request.model)))?;

        // The unique index closes the race two concurrent requests
        // have between the check above and this insert.
        let row_id = self.store.insert_pending_review(request, author)?;

        tracing::info!(
            submission = %request.submission_id,
            review_type = request.review_type.as_str(),
            personality = request.personality.as_str(),
            model = %request.model,
            "Review dispatched"
        );

        match self.generate(request, &submission_context(&submission), gateway, deadline).await {
            Ok(result) => {
                self.store.complete_review(row_id, &result)?;
                Ok(result)
            }
            Err(err) => {
                tracing::warn!(
                    submission = %request.submission_id,
                    model = %request.model,
                    error = %err,
                    "Review generation failed"
                );
                self.store.fail_review(row_id, &err.to_string())?;
                Err(ReviewError::GenerationFailed(Box::new(err)))
            }
        }
    }

    /// Dispatch the same request to several providers concurrently.
    ///
    /// Settle-all: one provider's failure never cancels the others.
    /// Returns the successes in the order `models` listed them; raises
    /// only when every provider failed.
    pub async fn request_multi_provider_review(
        &self,
        request: &ReviewRequest,
        models: &[String],
        author: &str,
        deadline: Option<Instant>,
    ) -> Result<Vec<ReviewResult>, ReviewError> {
        if models.is_empty() {
            return Err(ReviewError::InvalidRequest(
                "no providers configured".into(),
            ));
        }

        let mut set = JoinSet::new();
        for (index, model) in models.iter().enumerate() {
            let orchestrator = self.clone();
            let mut request = request.clone();
            request.model = model.clone();
            let author = author.to_string();
            set.spawn(async move {
                let outcome = orchestrator.request_review(&request, &author, deadline).await;
                (index, request.model, outcome)
            });
        }

        let mut slots: Vec<Option<Result<ReviewResult, ReviewError>>> =
            (0..models.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, _, outcome)) => slots[index] = Some(outcome),
                Err(join_err) => {
                    tracing::error!(error = %join_err, "Review task panicked");
                }
            }
        }

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for (slot, model) in slots.into_iter().zip(models) {
            match slot {
                Some(Ok(result)) => results.push(result),
                Some(Err(err)) => failures.push(provider_failure(model, err)),
                None => failures.push(ProviderError::new(
                    model.clone(),
                    ProviderErrorKind::Unknown,
                    "review task aborted",
                )),
            }
        }

        if results.is_empty() {
            return Err(ReviewError::AllProvidersFailed(failures));
        }
        Ok(results)
    }

    /// Fan out to every registered provider and reduce to a consensus.
    pub async fn request_comparative_review(
        &self,
        request: &ReviewRequest,
        author: &str,
        deadline: Option<Instant>,
    ) -> Result<ConsensusResult, ReviewError> {
        let models = self.providers.models();
        let results = self
            .request_multi_provider_review(request, &models, author, deadline)
            .await?;
        consensus::reduce(&results)
    }

    /// Submission-creation quota check for the ingest path.
    pub fn check_submission_quota(&self, author: &str) -> Result<(), ReviewError> {
        let recent = self
            .store
            .count_recent_submissions(author, window_start())?;
        if recent >= self.limits.submissions_per_hour {
            return Err(ReviewError::RateLimitExceeded(format!(
                "submission quota reached ({}/hour)",
                self.limits.submissions_per_hour
            )));
        }
        Ok(())
    }

    async fn generate(
        &self,
        request: &ReviewRequest,
        ctx: &SubmissionContext<'_>,
        gateway: Arc<dyn ProviderGateway>,
        deadline: Option<Instant>,
    ) -> Result<ReviewResult, ReviewError> {
        let budget = match deadline {
            Some(deadline) => deadline
                .checked_duration_since(Instant::now())
                .unwrap_or(Duration::ZERO)
                .min(self.provider_timeout),
            None => self.provider_timeout,
        };

        let prompt = build_prompt(request, ctx);
        let raw = tokio::time::timeout(budget, gateway.invoke(&prompt))
            .await
            .map_err(|_| ProviderError::timeout(gateway.name(), budget.as_secs()))??;

        let identity = ProviderIdentity {
            provider: gateway.name().to_string(),
            model: gateway.model().to_string(),
            personality: request.personality,
        };
        Ok(normalize(&raw, identity)?)
    }
}

fn submission_context(submission: &crate::store::Submission) -> SubmissionContext<'_> {
    SubmissionContext {
        code: &submission.code,
        language: &submission.language,
        description: submission.description.as_deref().unwrap_or(""),
    }
}

/// Reduce one provider's failure to a `ProviderError` for the batch
/// report, unwrapping the single-provider wrapper where possible.
fn provider_failure(model: &str, err: ReviewError) -> ProviderError {
    match err {
        ReviewError::GenerationFailed(inner) => match *inner {
            ReviewError::Provider(provider_err) => provider_err,
            other => ProviderError::new(model, ProviderErrorKind::Unknown, other.to_string()),
        },
        ReviewError::Provider(provider_err) => provider_err,
        other => ProviderError::new(model, ProviderErrorKind::Unknown, other.to_string()),
    }
}

fn window_start() -> i64 {
    chrono::Utc::now().timestamp() - QUOTA_WINDOW.as_secs() as i64
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockGateway;
    use crate::review::types::{Personality, ReviewType};
    use crate::store::{NewSubmission, SqliteStore};
    use uuid::Uuid;

    const CANNED: &str =
        r#"{"rating": 8, "summary": "Looks solid overall", "keyPoints": ["Clear naming"]}"#;

    fn store_with_submission() -> (Arc<SqliteStore>, Uuid) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let submission = store
            .insert_submission(NewSubmission {
                author: "user_a".into(),
                code: "fn main() {}".into(),
                language: "rust".into(),
                description: Some("toy program".into()),
            })
            .unwrap();
        (store, submission.id)
    }

    fn orchestrator(
        store: Arc<SqliteStore>,
        gateways: Vec<Arc<MockGateway>>,
    ) -> ReviewOrchestrator {
        let mut registry = ProviderRegistry::new();
        for gateway in gateways {
            registry.register(gateway);
        }
        ReviewOrchestrator::new(store, registry, RateLimits::default())
    }

    fn request(submission_id: Uuid, model: &str) -> ReviewRequest {
        ReviewRequest {
            submission_id,
            review_type: ReviewType::General,
            personality: Personality::Mentor,
            model: model.into(),
            focus_areas: Vec::new(),
            user_level: None,
        }
    }

    #[tokio::test]
    async fn single_provider_happy_path() {
        let (store, submission_id) = store_with_submission();
        let orch = orchestrator(store.clone(), vec![Arc::new(MockGateway::ok("gpt-4o", CANNED))]);

        let result = orch
            .request_review(&request(submission_id, "gpt-4o"), "user_a", None)
            .await
            .unwrap();
        assert_eq!(result.rating, 4); // 8/10 folded to the 1-5 scale
        assert_eq!(result.provider.model, "gpt-4o");

        let row = store
            .find_by_tuple(submission_id, ReviewType::General, Personality::Mentor, "gpt-4o")
            .unwrap()
            .unwrap();
        assert_eq!(row.status, ReviewStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_submission_is_not_found() {
        let (store, _) = store_with_submission();
        let orch = orchestrator(store, vec![Arc::new(MockGateway::ok("gpt-4o", CANNED))]);

        let err = orch
            .request_review(&request(Uuid::new_v4(), "gpt-4o"), "user_a", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::SubmissionNotFound));
    }

    #[tokio::test]
    async fn unknown_model_is_invalid_request() {
        let (store, submission_id) = store_with_submission();
        let orch = orchestrator(store, vec![Arc::new(MockGateway::ok("gpt-4o", CANNED))]);

        let err = orch
            .request_review(&request(submission_id, "no-such-model"), "user_a", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn duplicate_tuple_is_rejected() {
        let (store, submission_id) = store_with_submission();
        let orch = orchestrator(store, vec![Arc::new(MockGateway::ok("gpt-4o", CANNED))]);
        let req = request(submission_id, "gpt-4o");

        orch.request_review(&req, "user_a", None).await.unwrap();
        let err = orch.request_review(&req, "user_a", None).await.unwrap_err();
        assert!(matches!(err, ReviewError::DuplicateReview));
    }

    #[tokio::test]
    async fn quota_blocks_before_gateway_contact() {
        let (store, submission_id) = store_with_submission();
        let gateway = Arc::new(MockGateway::ok("gpt-4o", CANNED));
        let mut orch = orchestrator(store.clone(), vec![gateway.clone()]);
        orch.limits.reviews_per_hour = 1;

        let mut first = request(submission_id, "gpt-4o");
        first.review_type = ReviewType::Security;
        orch.request_review(&first, "user_a", None).await.unwrap();
        assert_eq!(gateway.calls(), 1);

        let err = orch
            .request_review(&request(submission_id, "gpt-4o"), "user_a", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::RateLimitExceeded(_)));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn gateway_failure_marks_row_failed_and_is_retryable() {
        let (store, submission_id) = store_with_submission();
        let failing = Arc::new(MockGateway::failing("gpt-4o", ProviderErrorKind::RateLimited));
        let orch = orchestrator(store.clone(), vec![failing]);
        let req = request(submission_id, "gpt-4o");

        let err = orch.request_review(&req, "user_a", None).await.unwrap_err();
        assert!(matches!(err, ReviewError::GenerationFailed(_)));

        let rows = store.reviews_for_submission(submission_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ReviewStatus::Failed);

        // A failed attempt does not hold the tuple; swap in a working
        // gateway and retry.
        let retry = orchestrator(store.clone(), vec![Arc::new(MockGateway::ok("gpt-4o", CANNED))]);
        retry.request_review(&req, "user_a", None).await.unwrap();
    }

    #[tokio::test]
    async fn partial_failure_returns_the_successes() {
        let (store, submission_id) = store_with_submission();
        let orch = orchestrator(
            store,
            vec![
                Arc::new(MockGateway::ok("model-a", CANNED)),
                Arc::new(MockGateway::failing("model-b", ProviderErrorKind::Timeout)),
                Arc::new(MockGateway::ok("model-c", CANNED)),
            ],
        );
        let models: Vec<String> =
            ["model-a", "model-b", "model-c"].iter().map(|m| m.to_string()).collect();

        let results = orch
            .request_multi_provider_review(&request(submission_id, "model-a"), &models, "user_a", None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].provider.model, "model-a");
        assert_eq!(results[1].provider.model, "model-c");
    }

    #[tokio::test]
    async fn total_failure_raises_all_providers_failed() {
        let (store, submission_id) = store_with_submission();
        let orch = orchestrator(
            store.clone(),
            vec![
                Arc::new(MockGateway::failing("model-a", ProviderErrorKind::Timeout)),
                Arc::new(MockGateway::failing("model-b", ProviderErrorKind::Auth)),
            ],
        );
        let models: Vec<String> = ["model-a", "model-b"].iter().map(|m| m.to_string()).collect();

        let err = orch
            .request_multi_provider_review(&request(submission_id, "model-a"), &models, "user_a", None)
            .await
            .unwrap_err();
        match err {
            ReviewError::AllProvidersFailed(failures) => assert_eq!(failures.len(), 2),
            other => panic!("expected AllProvidersFailed, got {other}"),
        }

        // No completed rows; every pending row was resolved.
        for row in store.reviews_for_submission(submission_id).unwrap() {
            assert_eq!(row.status, ReviewStatus::Failed);
        }
    }

    #[tokio::test]
    async fn comparative_review_reduces_all_registered_providers() {
        let (store, submission_id) = store_with_submission();
        let orch = orchestrator(
            store,
            vec![
                Arc::new(MockGateway::ok("model-a", CANNED)),
                Arc::new(MockGateway::ok("model-b", CANNED)),
            ],
        );

        let consensus = orch
            .request_comparative_review(&request(submission_id, "model-a"), "user_a", None)
            .await
            .unwrap();
        assert_eq!(consensus.members.len(), 2);
        assert_eq!(consensus.merged.provider.provider, "consensus");
        assert_eq!(consensus.confidence, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_times_out_slow_providers_individually() {
        let (store, submission_id) = store_with_submission();
        let slow = Arc::new(
            MockGateway::ok("model-slow", CANNED).with_latency(Duration::from_secs(60)),
        );
        let orch = orchestrator(
            store.clone(),
            vec![Arc::new(MockGateway::ok("model-fast", CANNED)), slow],
        );
        let models: Vec<String> =
            ["model-fast", "model-slow"].iter().map(|m| m.to_string()).collect();
        let deadline = Instant::now() + Duration::from_secs(5);

        let results = orch
            .request_multi_provider_review(
                &request(submission_id, "model-fast"),
                &models,
                "user_a",
                Some(deadline),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].provider.model, "model-fast");

        // The slow provider's row ended up failed, not abandoned.
        let rows = store.reviews_for_submission(submission_id).unwrap();
        assert!(rows
            .iter()
            .any(|row| row.model == "model-slow" && row.status == ReviewStatus::Failed));
    }

    #[tokio::test]
    async fn submission_quota_is_enforced() {
        let (store, _) = store_with_submission();
        let mut orch = orchestrator(store, vec![]);
        orch.limits.submissions_per_hour = 1;

        let err = orch.check_submission_quota("user_a").unwrap_err();
        assert!(matches!(err, ReviewError::RateLimitExceeded(_)));
        orch.check_submission_quota("user_b").unwrap();
    }
}
