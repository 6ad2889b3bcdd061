//! Tracked background review generation.
//!
//! Submission ingest seeds a handful of reviews without blocking the
//! request; every seeded review is a tracked task whose status can be
//! polled, mirroring the pending/completed/failed row lifecycle. Tasks
//! run sequentially on one worker so a burst of submissions cannot
//! stampede the providers.

use crate::review::{ReviewOrchestrator, ReviewRequest, ReviewStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

/// Terminal tasks stay pollable this long, then get evicted so the
/// status map stays bounded in a long-lived server.
const TASK_RETENTION: Duration = Duration::from_secs(3600);

/// One tracked unit of background work.
#[derive(Debug, Clone)]
pub struct ReviewTask {
    pub id: Uuid,
    pub request: ReviewRequest,
    pub status: ReviewStatus,
    pub error: Option<String>,
    /// When the task reached a terminal state.
    finished_at: Option<Instant>,
}

struct QueueItem {
    task_id: Uuid,
    request: ReviewRequest,
    author: String,
}

/// Handle to the background worker. Cloneable; all clones share the
/// same queue and status map.
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<QueueItem>,
    tasks: Arc<Mutex<HashMap<Uuid, ReviewTask>>>,
}

impl TaskQueue {
    /// Start the worker on the current runtime.
    pub fn spawn(orchestrator: ReviewOrchestrator) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<QueueItem>();
        let tasks: Arc<Mutex<HashMap<Uuid, ReviewTask>>> = Arc::new(Mutex::new(HashMap::new()));

        let worker_tasks = tasks.clone();
        tokio::spawn(async move {
            while let Some(item) = receiver.recv().await {
                let outcome = orchestrator
                    .request_review(&item.request, &item.author, None)
                    .await;

                let mut map = worker_tasks.lock();
                if let Some(task) = map.get_mut(&item.task_id) {
                    match outcome {
                        Ok(_) => task.status = ReviewStatus::Completed,
                        Err(err) => {
                            tracing::warn!(
                                task = %item.task_id,
                                error = %err,
                                "Background review failed"
                            );
                            task.status = ReviewStatus::Failed;
                            task.error = Some(err.to_string());
                        }
                    }
                    task.finished_at = Some(Instant::now());
                }
            }
        });

        Self { sender, tasks }
    }

    /// Queue one review. Returns the task id for status polling.
    ///
    /// Terminal tasks past [`TASK_RETENTION`] are evicted here, so the
    /// map's size tracks recent activity rather than process uptime.
    pub fn enqueue(&self, request: ReviewRequest, author: &str) -> Uuid {
        let task_id = Uuid::new_v4();
        {
            let mut map = self.tasks.lock();
            map.retain(|_, task| match task.finished_at {
                Some(at) => at.elapsed() < TASK_RETENTION,
                None => true,
            });
            map.insert(
                task_id,
                ReviewTask {
                    id: task_id,
                    request: request.clone(),
                    status: ReviewStatus::Pending,
                    error: None,
                    finished_at: None,
                },
            );
        }
        // The worker holds the receiver for the queue's lifetime; a
        // send failure means shutdown, where losing the task is fine.
        let _ = self.sender.send(QueueItem {
            task_id,
            request,
            author: author.to_string(),
        });
        task_id
    }

    pub fn status(&self, task_id: Uuid) -> Option<ReviewTask> {
        self.tasks.lock().get(&task_id).cloned()
    }
}

// ── Tests ────────────────────────────────────────────────────────
