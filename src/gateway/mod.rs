//! HTTP surface over the review orchestrator.
//!
//! Routes:
//! - `GET  /health` — liveness, always public
//! - `POST /api/submissions` — store code, seed background reviews
//! - `GET  /api/submissions/{id}/reviews` — list reviews for a submission
//! - `POST /api/reviews/generate` — one synchronous review
//! - `POST /api/reviews/compare` — multi-provider consensus review
//! - `GET  /api/tasks/{id}` — poll a background review task
//!
//! Error payloads carry safe generic strings, never raw provider
//! output. The client IP is the rate-limit principal.

use crate::config::Config;
use crate::error::ReviewError;
use crate::providers::ProviderRegistry;
use crate::review::types::{Personality, ReviewRequest, ReviewType, UserLevel};
use crate::review::{RateLimits, ReviewOrchestrator};
use crate::store::{NewSubmission, SqliteStore};
use crate::tasks::TaskQueue;
use anyhow::Result;
use axum::{
    extract::rejection::JsonRejection,
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rand::prelude::IndexedRandom;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use uuid::Uuid;

/// Code submissions included; 256 KiB covers any sane review target.
pub const MAX_BODY_SIZE: usize = 262_144;

pub const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Consensus fan-out gets most of the request budget.
const COMPARE_DEADLINE_SECS: u64 = 90;

/// Review kinds seeded in the background on every submission.
const SEEDED_KINDS: [ReviewType; 4] = [
    ReviewType::Security,
    ReviewType::Performance,
    ReviewType::BestPractices,
    ReviewType::Style,
];

#[derive(Clone)]
pub struct AppState {
    orchestrator: ReviewOrchestrator,
    queue: TaskQueue,
    auth_token: Option<Arc<str>>,
}

/// Bind and serve until the process is stopped.
pub async fn run_gateway(config: Config) -> Result<()> {
    if is_public_bind(&config.gateway.bind) && config.gateway.auth_token.is_none() {
        anyhow::bail!(
            "Refusing to bind publicly to {} without an auth token.\n\
             Fix: bind to 127.0.0.1, or set [gateway] auth_token in config.toml.",
            config.gateway.bind
        );
    }

    let store = Arc::new(SqliteStore::open(&config.storage.path)?);
    let registry = ProviderRegistry::from_config(&config.providers);
    if registry.is_empty() {
        tracing::warn!("No providers configured; review generation will fail");
    }

    let orchestrator = ReviewOrchestrator::new(
        store,
        registry,
        RateLimits {
            submissions_per_hour: config.limits.submissions_per_hour,
            reviews_per_hour: config.limits.reviews_per_hour,
        },
    );
    let queue = TaskQueue::spawn(orchestrator.clone());

    let state = AppState {
        orchestrator,
        queue,
        auth_token: config.gateway.auth_token.as_deref().map(Arc::from),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/api/submissions", post(handle_submission_create))
        .route(
            "/api/submissions/{id}/reviews",
            get(handle_submission_reviews),
        )
        .route("/api/reviews/generate", post(handle_review_generate))
        .route("/api/reviews/compare", post(handle_review_compare))
        .route("/api/tasks/{id}", get(handle_task_status))
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ));

    let listener = tokio::net::TcpListener::bind(&config.gateway.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "Gateway listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
    })
    .await?;
    Ok(())
}

// ── Request bodies ───────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct SubmissionBody {
    code: String,
    language: String,
    description: Option<String>,
    /// Seed background reviews on ingest (default true).
    seed_reviews: Option<bool>,
}

#[derive(Debug, serde::Deserialize)]
struct GenerateBody {
    submission_id: Uuid,
    #[serde(rename = "type")]
    review_type: ReviewType,
    personality: Personality,
    model: String,
    #[serde(default)]
    focus_areas: Vec<String>,
    user_level: Option<UserLevel>,
}

#[derive(Debug, serde::Deserialize)]
struct CompareBody {
    submission_id: Uuid,
    #[serde(rename = "type")]
    review_type: ReviewType,
    personality: Personality,
    #[serde(default)]
    focus_areas: Vec<String>,
    user_level: Option<UserLevel>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

// ── Handlers ─────────────────────────────────────────────────────

/// GET /health — always public (no secrets leaked)
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /api/submissions
async fn handle_submission_create(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<SubmissionBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;
    let Json(body) = body.map_err(bad_body)?;
    let principal = addr.ip().to_string();

    if body.code.trim().is_empty() {
        return Err(error_response(&ReviewError::InvalidRequest(
            "code must not be empty".into(),
        )));
    }

    state
        .orchestrator
        .check_submission_quota(&principal)
        .map_err(|e| error_response(&e))?;

    let submission = state
        .orchestrator
        .store()
        .insert_submission(NewSubmission {
            author: principal.clone(),
            code: body.code,
            language: body.language,
            description: body.description,
        })
        .map_err(|e| error_response(&e.into()))?;

    let mut task_ids = Vec::new();
    if body.seed_reviews.unwrap_or(true) {
        task_ids = seed_reviews(&state, submission.id, &principal);
    }

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": submission.id,
            "created_at": submission.created_at,
            "task_ids": task_ids,
        })),
    ))
}

/// Queue one background review per kind in [`SEEDED_KINDS`], each with
/// a random personality and a random registered model.
fn seed_reviews(state: &AppState, submission_id: Uuid, principal: &str) -> Vec<Uuid> {
    let models = state.orchestrator.registry().models();
    if models.is_empty() {
        return Vec::new();
    }

    let mut rng = rand::rng();
    SEEDED_KINDS
        .iter()
        .map(|&review_type| {
            let personality = *Personality::ALL
                .choose(&mut rng)
                .unwrap_or(&Personality::Mentor);
            let model = models
                .choose(&mut rng)
                .cloned()
                .unwrap_or_else(|| models[0].clone());
            state.queue.enqueue(
                ReviewRequest {
                    submission_id,
                    review_type,
                    personality,
                    model,
                    focus_areas: Vec::new(),
                    user_level: None,
                },
                principal,
            )
        })
        .collect()
}

/// GET /api/submissions/{id}/reviews
async fn handle_submission_reviews(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;

    if state
        .orchestrator
        .store()
        .get_submission(id)
        .map_err(|e| error_response(&e.into()))?
        .is_none()
    {
        return Err(error_response(&ReviewError::SubmissionNotFound));
    }

    let rows = state
        .orchestrator
        .store()
        .reviews_for_submission(id)
        .map_err(|e| error_response(&e.into()))?;

    let reviews: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|row| {
            serde_json::json!({
                "id": row.id,
                "type": row.review_type.as_str(),
                "personality": row.personality.as_str(),
                "model": row.model,
                "status": row.status.as_str(),
                "result": row.result,
                "created_at": row.created_at,
                "completed_at": row.completed_at,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({ "reviews": reviews })))
}

/// POST /api/reviews/generate
async fn handle_review_generate(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;
    let Json(body) = body.map_err(bad_body)?;

    let request = ReviewRequest {
        submission_id: body.submission_id,
        review_type: body.review_type,
        personality: body.personality,
        model: body.model,
        focus_areas: body.focus_areas,
        user_level: body.user_level,
    };

    let result = state
        .orchestrator
        .request_review(&request, &addr.ip().to_string(), None)
        .await
        .map_err(|e| error_response(&e))?;

    Ok((StatusCode::CREATED, Json(result)))
}

/// POST /api/reviews/compare
async fn handle_review_compare(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<CompareBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;
    let Json(body) = body.map_err(bad_body)?;

    let request = ReviewRequest {
        submission_id: body.submission_id,
        review_type: body.review_type,
        personality: body.personality,
        model: String::new(), // overridden per provider in the fan-out
        focus_areas: body.focus_areas,
        user_level: body.user_level,
    };
    let deadline = Instant::now() + Duration::from_secs(COMPARE_DEADLINE_SECS);

    let consensus = state
        .orchestrator
        .request_comparative_review(&request, &addr.ip().to_string(), Some(deadline))
        .await
        .map_err(|e| error_response(&e))?;

    Ok((StatusCode::CREATED, Json(consensus)))
}

/// GET /api/tasks/{id}
async fn handle_task_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers)?;

    let task = state.queue.status(id).ok_or((
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Unknown task"})),
    ))?;

    Ok(Json(serde_json::json!({
        "id": task.id,
        "status": task.status.as_str(),
        "model": task.request.model,
        "personality": task.request.personality.as_str(),
        "error": task.error,
    })))
}

// ── Auth + error mapping ─────────────────────────────────────────

/// Check the bearer token when one is configured.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.auth_token.as_deref() else {
        return Ok(());
    };
    match extract_bearer_token(headers) {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Invalid or missing bearer token"})),
        )),
    }
}

/// Extract bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": format!("Invalid request body: {rejection}")})),
    )
}

/// Map the error taxonomy onto status codes with safe messages.
fn error_response(err: &ReviewError) -> ApiError {
    let (status, message) = match err {
        ReviewError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        ReviewError::RateLimitExceeded(msg) => (StatusCode::TOO_MANY_REQUESTS, msg.clone()),
        ReviewError::DuplicateReview => (
            StatusCode::CONFLICT,
            "A review for this combination already exists".into(),
        ),
        ReviewError::SubmissionNotFound => (StatusCode::NOT_FOUND, "Unknown submission".into()),
        ReviewError::GenerationFailed(_)
        | ReviewError::AllProvidersFailed(_)
        | ReviewError::Provider(_)
        | ReviewError::Normalization(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Review generation failed".into(),
        ),
        ReviewError::EmptyResultSet | ReviewError::Store(_) => {
            tracing::error!(error = %err, "Internal failure in review path");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
        }
    };
    (status, Json(serde_json::json!({"error": message})))
}

/// Anything that is not loopback counts as public.
fn is_public_bind(bind: &str) -> bool {
    let host = bind.rsplit_once(':').map(|(h, _)| h).unwrap_or(bind);
    !matches!(host, "127.0.0.1" | "localhost" | "[::1]" | "::1")
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn security_body_limit_is_256kb() {
        assert_eq!(MAX_BODY_SIZE, 262_144);
    }

    #[test]
    fn generate_body_rejects_invalid_enums() {
        let valid = r#"{"submission_id": "7f1f1f1f-1111-2222-3333-444444444444",
                        "type": "security", "personality": "roaster", "model": "gpt-4o"}"#;
        assert!(serde_json::from_str::<GenerateBody>(valid).is_ok());

        let bad_type = r#"{"submission_id": "7f1f1f1f-1111-2222-3333-444444444444",
                           "type": "vibes", "personality": "roaster", "model": "gpt-4o"}"#;
        assert!(serde_json::from_str::<GenerateBody>(bad_type).is_err());
    }

    #[test]
    fn error_taxonomy_maps_to_status_codes() {
        let cases = [
            (
                ReviewError::InvalidRequest("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ReviewError::RateLimitExceeded("x".into()),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (ReviewError::DuplicateReview, StatusCode::CONFLICT),
            (ReviewError::SubmissionNotFound, StatusCode::NOT_FOUND),
            (
                ReviewError::AllProvidersFailed(Vec::new()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(error_response(&err).0, expected, "{err}");
        }
    }

    #[test]
    fn internal_errors_never_leak_details() {
        let err = ReviewError::Store("secret connection string".into());
        let (status, Json(body)) = error_response(&err);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body["error"].as_str().unwrap().contains("secret"));
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc123"),
        );
        assert_eq!(extract_bearer_token(&headers), Some("abc123"));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic abc123"),
        );
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"token", b"token"));
        assert!(!constant_time_eq(b"token", b"other"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }

    #[tokio::test]
    async fn ingest_seeds_one_review_per_kind() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(crate::providers::MockGateway::ok("gpt-4o", "{}")));
        let orchestrator = ReviewOrchestrator::new(store, registry, RateLimits::default());
        let queue = TaskQueue::spawn(orchestrator.clone());
        let state = AppState {
            orchestrator,
            queue: queue.clone(),
            auth_token: None,
        };

        let task_ids = seed_reviews(&state, Uuid::new_v4(), "203.0.113.9");
        let kinds: Vec<ReviewType> = task_ids
            .iter()
            .map(|id| queue.status(*id).expect("seeded task is tracked").request.review_type)
            .collect();
        assert_eq!(kinds, SEEDED_KINDS);
    }

    #[test]
    fn public_bind_detection() {
        assert!(!is_public_bind("127.0.0.1:8787"));
        assert!(!is_public_bind("localhost:8080"));
        assert!(is_public_bind("0.0.0.0:8787"));
        assert!(is_public_bind("192.168.1.5:8787"));
    }
}
