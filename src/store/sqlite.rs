//! SQLite-backed review store.
//!
//! Tables:
//! - `submissions`: author, language, description, code, created_at
//! - `reviews`: one row per (submission, type, personality, model)
//!   attempt, with a partial unique index over non-failed rows so the
//!   "one active review per tuple" rule is enforced by the database,
//!   not by application-level check-then-insert.

use super::{NewSubmission, ReviewRow, ReviewStore, StoreError, Submission};
use crate::review::types::{
    Personality, ReviewRequest, ReviewResult, ReviewStatus, ReviewType,
};
use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use std::path::Path;
use uuid::Uuid;

pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    /// Open (or create) the review database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(db_path)
            .with_context(|| format!("opening review db at {}", db_path.display()))?;
        Self::init(conn)
    }

    /// In-memory store for tests and the one-shot CLI path.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(rusqlite::Connection::open_in_memory()?)
    }

    fn init(conn: rusqlite::Connection) -> Result<Self> {
        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS submissions (
                id TEXT PRIMARY KEY,
                author TEXT NOT NULL,
                language TEXT NOT NULL,
                description TEXT,
                code TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_submissions_author
                ON submissions(author, created_at);

            CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                submission_id TEXT NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
                author TEXT NOT NULL,
                review_type TEXT NOT NULL,
                personality TEXT NOT NULL,
                model TEXT NOT NULL,
                status TEXT NOT NULL,
                result TEXT,
                error TEXT,
                created_at INTEGER NOT NULL,
                completed_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_reviews_submission
                ON reviews(submission_id);
            CREATE INDEX IF NOT EXISTS idx_reviews_author
                ON reviews(author, created_at);
            -- Failed attempts may be retried; pending/completed may not.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_reviews_active_tuple
                ON reviews(submission_id, review_type, personality, model)
                WHERE status != 'failed';",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ReviewStore for SqliteStore {
    fn insert_submission(&self, new: NewSubmission) -> Result<Submission, StoreError> {
        let id = Uuid::new_v4();
        let now = epoch_secs();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO submissions (id, author, language, description, code, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                id.to_string(),
                new.author,
                new.language,
                new.description,
                new.code,
                now,
            ],
        )
        .map_err(|e| StoreError::Other(e.into()))?;

        Ok(Submission {
            id,
            author: new.author,
            code: new.code,
            language: new.language,
            description: new.description,
            created_at: now,
        })
    }

    fn get_submission(&self, id: Uuid) -> Result<Option<Submission>, StoreError> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT id, author, language, description, code, created_at
             FROM submissions WHERE id = ?1",
            rusqlite::params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        );

        match row {
            Ok((id, author, language, description, code, created_at)) => Ok(Some(Submission {
                id: parse_uuid(&id)?,
                author,
                code,
                language,
                description,
                created_at,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Other(e.into())),
        }
    }

    fn count_recent_submissions(&self, author: &str, window_start: i64) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM submissions WHERE author = ?1 AND created_at >= ?2",
                rusqlite::params![author, window_start],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Other(e.into()))?;
        Ok(count as u64)
    }

    fn insert_pending_review(
        &self,
        request: &ReviewRequest,
        author: &str,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO reviews (id, submission_id, author, review_type, personality, model,
                                  status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                id.to_string(),
                request.submission_id.to_string(),
                author,
                request.review_type.as_str(),
                request.personality.as_str(),
                request.model,
                ReviewStatus::Pending.as_str(),
                epoch_secs(),
            ],
        );

        match result {
            Ok(_) => Ok(id),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateKey)
            }
            Err(e) => Err(StoreError::Other(e.into())),
        }
    }

    fn complete_review(&self, id: Uuid, result: &ReviewResult) -> Result<(), StoreError> {
        let json = serde_json::to_string(result)
            .map_err(|e| StoreError::Other(e.into()))?;
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE reviews SET status = ?1, result = ?2, completed_at = ?3
                 WHERE id = ?4 AND status = ?5",
                rusqlite::params![
                    ReviewStatus::Completed.as_str(),
                    json,
                    epoch_secs(),
                    id.to_string(),
                    ReviewStatus::Pending.as_str(),
                ],
            )
            .map_err(|e| StoreError::Other(e.into()))?;
        if updated == 0 {
            return Err(StoreError::Other(anyhow!("review {id} is not pending")));
        }
        Ok(())
    }

    fn fail_review(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE reviews SET status = ?1, error = ?2, completed_at = ?3
                 WHERE id = ?4 AND status = ?5",
                rusqlite::params![
                    ReviewStatus::Failed.as_str(),
                    error,
                    epoch_secs(),
                    id.to_string(),
                    ReviewStatus::Pending.as_str(),
                ],
            )
            .map_err(|e| StoreError::Other(e.into()))?;
        if updated == 0 {
            return Err(StoreError::Other(anyhow!("review {id} is not pending")));
        }
        Ok(())
    }

    fn find_by_tuple(
        &self,
        submission_id: Uuid,
        review_type: ReviewType,
        personality: Personality,
        model: &str,
    ) -> Result<Option<ReviewRow>, StoreError> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            &format!(
                "SELECT {REVIEW_COLUMNS} FROM reviews
                 WHERE submission_id = ?1 AND review_type = ?2
                   AND personality = ?3 AND model = ?4 AND status != 'failed'"
            ),
            rusqlite::params![
                submission_id.to_string(),
                review_type.as_str(),
                personality.as_str(),
                model,
            ],
            review_row_from_sql,
        );

        match row {
            Ok(raw) => Ok(Some(raw.into_row()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Other(e.into())),
        }
    }

    fn reviews_for_submission(&self, submission_id: Uuid) -> Result<Vec<ReviewRow>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {REVIEW_COLUMNS} FROM reviews
                 WHERE submission_id = ?1 ORDER BY created_at ASC"
            ))
            .map_err(|e| StoreError::Other(e.into()))?;
        let raws = stmt
            .query_map(
                rusqlite::params![submission_id.to_string()],
                review_row_from_sql,
            )
            .map_err(|e| StoreError::Other(e.into()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Other(e.into()))?;

        raws.into_iter().map(RawReviewRow::into_row).collect()
    }

    fn count_recent_reviews(&self, author: &str, window_start: i64) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM reviews WHERE author = ?1 AND created_at >= ?2",
                rusqlite::params![author, window_start],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Other(e.into()))?;
        Ok(count as u64)
    }
}

const REVIEW_COLUMNS: &str = "id, submission_id, author, review_type, personality, model, \
                              status, result, error, created_at, completed_at";

/// Column tuple before UUID/JSON decoding (rusqlite closures can only
/// fail with rusqlite errors).
struct RawReviewRow {
    id: String,
    submission_id: String,
    author: String,
    review_type: String,
    personality: String,
    model: String,
    status: String,
    result: Option<String>,
    error: Option<String>,
    created_at: i64,
    completed_at: Option<i64>,
}

fn review_row_from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawReviewRow> {
    Ok(RawReviewRow {
        id: row.get(0)?,
        submission_id: row.get(1)?,
        author: row.get(2)?,
        review_type: row.get(3)?,
        personality: row.get(4)?,
        model: row.get(5)?,
        status: row.get(6)?,
        result: row.get(7)?,
        error: row.get(8)?,
        created_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

impl RawReviewRow {
    fn into_row(self) -> Result<ReviewRow, StoreError> {
        let result = match self.result {
            Some(json) => Some(
                serde_json::from_str(&json)
                    .map_err(|e| StoreError::Other(anyhow!("corrupt result json: {e}")))?,
            ),
            None => None,
        };
        Ok(ReviewRow {
            id: parse_uuid(&self.id)?,
            submission_id: parse_uuid(&self.submission_id)?,
            author: self.author,
            review_type: ReviewType::from_str_lossy(&self.review_type),
            personality: Personality::from_str_lossy(&self.personality),
            model: self.model,
            status: ReviewStatus::from_str_lossy(&self.status),
            result,
            error: self.error,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

fn parse_uuid(text: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(text).map_err(|e| StoreError::Other(anyhow!("corrupt uuid {text}: {e}")))
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

// ── Tests ───────────────────────────────────────────────────────────
