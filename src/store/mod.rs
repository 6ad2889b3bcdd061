//! Durable submission and review records behind a narrow interface.
//!
//! The orchestrator only needs keyed inserts, status transitions, a
//! tuple lookup, and rolling-window counts. The storage layer enforces
//! the uniqueness of one active review per
//! (submission, review type, personality, model) tuple; a constraint
//! violation surfaces as [`StoreError::DuplicateKey`] so two
//! concurrent requests for the same tuple cannot both win.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::review::types::{
    Personality, ReviewRequest, ReviewResult, ReviewStatus, ReviewType,
};
use uuid::Uuid;

/// Storage failures, separated so the orchestrator can turn a
/// uniqueness violation into a duplicate-review rejection.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The active-review uniqueness constraint fired.
    #[error("duplicate key")]
    DuplicateKey,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A submission as received from a client, before it has an identity.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    /// Rate-limit principal (user id or API-key fingerprint).
    pub author: String,
    pub code: String,
    pub language: String,
    pub description: Option<String>,
}

/// A stored submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: Uuid,
    pub author: String,
    pub code: String,
    pub language: String,
    pub description: Option<String>,
    pub created_at: i64,
}

/// One review row. `result` is present only at `Completed`,
/// `error` only at `Failed`.
#[derive(Debug, Clone)]
pub struct ReviewRow {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub author: String,
    pub review_type: ReviewType,
    pub personality: Personality,
    pub model: String,
    pub status: ReviewStatus,
    pub result: Option<ReviewResult>,
    pub error: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// Record storage as the orchestrator sees it.
///
/// Rows move `Pending -> Completed` or `Pending -> Failed` and never
/// again; implementations must refuse transitions out of a terminal
/// state.
pub trait ReviewStore: Send + Sync {
    fn insert_submission(&self, new: NewSubmission) -> Result<Submission, StoreError>;
    fn get_submission(&self, id: Uuid) -> Result<Option<Submission>, StoreError>;
    fn count_recent_submissions(&self, author: &str, window_start: i64) -> Result<u64, StoreError>;

    /// Insert a `Pending` row for the request's tuple.
    /// Returns `DuplicateKey` if an active row for the tuple exists.
    fn insert_pending_review(
        &self,
        request: &ReviewRequest,
        author: &str,
    ) -> Result<Uuid, StoreError>;

    fn complete_review(&self, id: Uuid, result: &ReviewResult) -> Result<(), StoreError>;
    fn fail_review(&self, id: Uuid, error: &str) -> Result<(), StoreError>;

    fn find_by_tuple(
        &self,
        submission_id: Uuid,
        review_type: ReviewType,
        personality: Personality,
        model: &str,
    ) -> Result<Option<ReviewRow>, StoreError>;

    fn reviews_for_submission(&self, submission_id: Uuid) -> Result<Vec<ReviewRow>, StoreError>;
    fn count_recent_reviews(&self, author: &str, window_start: i64) -> Result<u64, StoreError>;
}
