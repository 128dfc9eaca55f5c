//! In-process job queue for testing.
//!
//! Honours idempotency tags and due times like the SQLite queue, and keeps
//! every job so tests can assert on what was enqueued.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use playbymail_domain::JobId;

use crate::infrastructure::ports::{
    Job, JobCounts, JobKind, JobQueuePort, JobStatus, QueueError,
};

#[derive(Debug, Clone)]
pub struct RecordedJob {
    pub job: Job,
    pub status: JobStatus,
}

#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<RecordedJob>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<RecordedJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn tags_of(&self, kind: JobKind) -> Vec<String> {
        self.jobs()
            .into_iter()
            .filter(|r| r.job.kind == kind)
            .map(|r| r.job.tag)
            .collect()
    }

    pub fn pending_of(&self, kind: JobKind) -> usize {
        self.jobs()
            .iter()
            .filter(|r| r.job.kind == kind && r.status == JobStatus::Pending)
            .count()
    }

    pub fn status_of(&self, id: JobId) -> Option<JobStatus> {
        self.jobs()
            .into_iter()
            .find(|r| r.job.id == id)
            .map(|r| r.status)
    }

    fn update(&self, id: JobId, f: impl FnOnce(&mut RecordedJob)) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|r| r.job.id == id)
            .ok_or_else(|| QueueError::new(format!("Job not found: {}", id)))?;
        f(job);
        Ok(())
    }
}

#[async_trait]
impl JobQueuePort for RecordingQueue {
    async fn enqueue(
        &self,
        kind: JobKind,
        payload: serde_json::Value,
        tag: &str,
    ) -> Result<Option<JobId>, QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.iter().any(|r| r.job.tag == tag) {
            return Ok(None);
        }
        let id = JobId::new();
        jobs.push(RecordedJob {
            job: Job {
                id,
                kind,
                payload,
                tag: tag.to_string(),
                attempts: 0,
                run_at: DateTime::<Utc>::MIN_UTC,
                last_error: None,
            },
            status: JobStatus::Pending,
        });
        Ok(Some(id))
    }

    async fn dequeue(
        &self,
        kinds: &[JobKind],
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let next = jobs
            .iter_mut()
            .filter(|r| {
                r.status == JobStatus::Pending && kinds.contains(&r.job.kind) && r.job.run_at <= now
            })
            .min_by_key(|r| r.job.run_at);
        Ok(next.map(|r| {
            r.status = JobStatus::Running;
            r.job.clone()
        }))
    }

    async fn complete(&self, id: JobId) -> Result<(), QueueError> {
        self.update(id, |r| r.status = JobStatus::Completed)
    }

    async fn retry(
        &self,
        id: JobId,
        error: &str,
        run_at: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        self.update(id, |r| {
            r.status = JobStatus::Pending;
            r.job.attempts += 1;
            r.job.run_at = run_at;
            r.job.last_error = Some(error.to_string());
        })
    }

    async fn dead_letter(&self, id: JobId, error: &str) -> Result<(), QueueError> {
        self.update(id, |r| {
            r.status = JobStatus::DeadLettered;
            r.job.attempts += 1;
            r.job.last_error = Some(error.to_string());
        })
    }

    async fn counts(&self) -> Result<JobCounts, QueueError> {
        let mut counts = JobCounts::default();
        for r in self.jobs.lock().unwrap().iter() {
            match r.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::DeadLettered => counts.dead_lettered += 1,
            }
        }
        Ok(counts)
    }
}
