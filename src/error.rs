//! Public error taxonomy for the review engine.
//!
//! The orchestrator is the only boundary that converts internal component
//! failures into these variants; callers (the HTTP gateway, the CLI, the
//! task queue) map them to status codes or exit messages without ever
//! seeing raw provider payloads.

use thiserror::Error;

// ── Provider errors ──────────────────────────────────────────────

/// Failure class for a single provider invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The call exceeded the per-invocation deadline.
    Timeout,
    /// Credentials were rejected by the vendor.
    Auth,
    /// The vendor throttled us.
    RateLimited,
    /// The vendor rejected the request shape.
    MalformedRequest,
    /// Transport failures and anything unclassified.
    Unknown,
}

impl ProviderErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Auth => "auth",
            Self::RateLimited => "rate_limited",
            Self::MalformedRequest => "malformed_request",
            Self::Unknown => "unknown",
        }
    }

    /// Whether a caller-side retry could plausibly succeed.
    /// Everything is transient except rejected credentials.
    pub fn retryable(self) -> bool {
        !matches!(self, Self::Auth)
    }
}

/// Error from one [`crate::providers::ProviderGateway`] invocation.
#[derive(Debug, Clone, Error)]
#[error("provider '{provider}' failed ({}): {message}", kind.label())]
pub struct ProviderError {
    /// Which vendor binding produced the failure.
    pub provider: String,
    /// Failure class for retry decisions.
    pub kind: ProviderErrorKind,
    /// Internal detail; never forwarded verbatim to end users.
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(provider: impl Into<String>, secs: u64) -> Self {
        Self::new(
            provider,
            ProviderErrorKind::Timeout,
            format!("call exceeded {secs}s deadline"),
        )
    }
}

// ── Normalization errors ─────────────────────────────────────────

/// The normalizer is permissive by design: it only fails when there is
/// nothing to work with at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("provider returned empty output")]
    EmptyOutput,
}

// ── Review engine taxonomy ───────────────────────────────────────

/// Top-level error surface of the review engine.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Bad enum value or request shape. Caller error, not retryable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The principal exhausted its rolling-window quota.
    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// A completed or in-flight review already exists for this
    /// (submission, type, personality, model) tuple.
    #[error("a review already exists for this submission/type/personality/model")]
    DuplicateReview,

    /// The referenced submission is unknown.
    #[error("submission not found")]
    SubmissionNotFound,

    /// A provider invocation failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Provider output defect; the review row is marked failed.
    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    /// Wraps any lower-level failure on the single-provider path,
    /// after the pending row has been resolved to `failed`.
    #[error("review generation failed: {0}")]
    GenerationFailed(#[source] Box<ReviewError>),

    /// Every provider on the multi-provider path failed.
    #[error("all {} provider(s) failed", .0.len())]
    AllProvidersFailed(Vec<ProviderError>),

    /// Consensus was asked to reduce zero results. Programmer error.
    #[error("consensus requires at least one review result")]
    EmptyResultSet,

    /// Record store failure unrelated to the uniqueness constraint.
    #[error("store error: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_are_not_retryable() {
        assert!(!ProviderErrorKind::Auth.retryable());
        assert!(ProviderErrorKind::Timeout.retryable());
        assert!(ProviderErrorKind::RateLimited.retryable());
        assert!(ProviderErrorKind::Unknown.retryable());
    }

    #[test]
    fn provider_error_display_includes_kind() {
        let err = ProviderError::timeout("openai", 30);
        let text = err.to_string();
        assert!(text.contains("openai"));
        assert!(text.contains("timeout"));
        assert!(text.contains("30s"));
    }

    #[test]
    fn all_providers_failed_counts_members() {
        let err = ReviewError::AllProvidersFailed(vec![
            ProviderError::timeout("openai", 30),
            ProviderError::new("gemini", ProviderErrorKind::Auth, "bad key"),
        ]);
        assert!(err.to_string().contains("2 provider(s)"));
    }
}
