use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::analyze::types::{AnalysisKind, AnalysisResult};

/// Jobs older than this are swept once they are out of `processing`.
const JOB_TTL_MINUTES: i64 = 60;
const MAX_JOBS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Bookkeeping record for one analysis request. Mutated only by the queue;
/// status never moves backward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: Uuid,
    pub message_id: String,
    pub kind: AnalysisKind,
    pub status: JobStatus,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

struct QueueInner {
    jobs: VecDeque<ProcessingJob>,
    draining: bool,
}

/// Bounded FIFO of processing jobs. This is an observability layer: tier
/// escalation runs synchronously inside the analysis call, one request at a
/// time, and the queue records what happened to each request.
pub struct JobQueue {
    inner: Mutex<QueueInner>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                jobs: VecDeque::new(),
                draining: false,
            }),
        }
    }

    pub fn enqueue(&self, message_id: &str, kind: AnalysisKind) -> Uuid {
        let job = ProcessingJob {
            id: Uuid::new_v4(),
            message_id: message_id.to_string(),
            kind,
            status: JobStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        let id = job.id;

        let mut inner = self.lock();
        if inner.jobs.len() >= MAX_JOBS {
            // Bounded: shed the oldest job that is not mid-flight.
            if let Some(pos) = inner
                .jobs
                .iter()
                .position(|j| j.status != JobStatus::Processing)
            {
                let dropped = inner.jobs.remove(pos);
                debug!(job = ?dropped.map(|j| j.id), "queue full, dropped oldest job");
            }
        }
        inner.jobs.push_back(job);
        id
    }

    /// Move a pending job into `processing`. Ignored for any other state.
    pub fn mark_processing(&self, id: Uuid) {
        let mut inner = self.lock();
        if let Some(job) = inner.jobs.iter_mut().find(|j| j.id == id) {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Processing;
            }
        }
    }

    pub fn mark_completed(&self, id: Uuid, result: &AnalysisResult) {
        let mut inner = self.lock();
        if let Some(job) = inner.jobs.iter_mut().find(|j| j.id == id) {
            if matches!(job.status, JobStatus::Pending | JobStatus::Processing) {
                job.status = JobStatus::Completed;
                job.result = Some(result.clone());
                job.completed_at = Some(Utc::now());
            }
        }
    }

    pub fn mark_failed(&self, id: Uuid, error: &str) {
        let mut inner = self.lock();
        if let Some(job) = inner.jobs.iter_mut().find(|j| j.id == id) {
            if matches!(job.status, JobStatus::Pending | JobStatus::Processing) {
                job.status = JobStatus::Failed;
                job.error = Some(error.to_string());
                job.completed_at = Some(Utc::now());
            }
        }
    }

    /// Drop jobs older than one hour that are not currently `processing`.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::minutes(JOB_TTL_MINUTES);
        let mut inner = self.lock();
        let before = inner.jobs.len();
        inner
            .jobs
            .retain(|j| j.status == JobStatus::Processing || j.created_at > cutoff);
        let swept = before - inner.jobs.len();
        if swept > 0 {
            debug!(swept, "swept expired jobs");
        }
        swept
    }

    pub fn job(&self, id: Uuid) -> Option<ProcessingJob> {
        self.lock().jobs.iter().find(|j| j.id == id).cloned()
    }

    /// Snapshot of every tracked job, oldest first.
    pub fn jobs(&self) -> Vec<ProcessingJob> {
        self.lock().jobs.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_draining(&self, draining: bool) {
        self.lock().draining = draining;
    }

    pub fn is_draining(&self) -> bool {
        self.lock().draining
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
