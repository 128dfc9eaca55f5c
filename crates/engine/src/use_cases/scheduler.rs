//! Background job execution and the turn deadline sweeper.
//!
//! Delivery is at-least-once: a job may run again after a crash, so every
//! handler checks whether its effect already happened before acting.
//!
//! Follow-up jobs are enqueued after their transaction commits, so a queue
//! outage at that moment loses them. The sweeper re-enqueues them from what
//! the store still shows: sheets of started instances left `pending`, and
//! join submissions left `received`. Job tags make the repeat a no-op.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use playbymail_domain::{GameInstance, JobId};

use crate::infrastructure::config::RetryConfig;
use crate::infrastructure::correlation::CorrelationId;
use crate::infrastructure::ports::{
    ClockPort, Job, JobKind, JobQueuePort, QueueError, RandomPort, RepoError, Store,
};
use crate::use_cases::advance::TurnAdvancer;
use crate::use_cases::context::RequestContext;
use crate::use_cases::error::JobError;
use crate::use_cases::jobs::{
    decode_payload, deadline_advance_tag, enqueue_advance, enqueue_join, enqueue_renders,
    AdvancePayload, JoinPayload, RenderPayload,
};
use crate::use_cases::join::PlayerEnrollment;
use crate::use_cases::render::SheetRenderer;

/// What happened to one claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Retried { run_at: DateTime<Utc> },
    DeadLettered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub id: JobId,
    pub kind: JobKind,
    pub outcome: JobOutcome,
}

/// Runs `advance-if-ready`, `render-sheet` and `join-player` jobs.
pub struct JobRunner {
    queue: Arc<dyn JobQueuePort>,
    clock: Arc<dyn ClockPort>,
    random: Arc<dyn RandomPort>,
    retry: RetryConfig,
    advancer: Arc<TurnAdvancer>,
    renderer: Arc<SheetRenderer>,
    enrollment: Arc<PlayerEnrollment>,
}

impl JobRunner {
    pub fn new(
        queue: Arc<dyn JobQueuePort>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
        retry: RetryConfig,
        advancer: Arc<TurnAdvancer>,
        renderer: Arc<SheetRenderer>,
        enrollment: Arc<PlayerEnrollment>,
    ) -> Self {
        Self {
            queue,
            clock,
            random,
            retry,
            advancer,
            renderer,
            enrollment,
        }
    }

    /// Poll until `cancel` fires, sleeping `poll` whenever the queue is empty.
    pub async fn run(&self, poll: Duration, cancel: CancellationToken) {
        tracing::info!(poll_ms = poll.as_millis() as u64, "Starting job runner");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.run_once(&cancel).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "Job queue unavailable"),
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(poll) => {}
            }
        }
        tracing::info!("Job runner stopped");
    }

    /// Claim and run one due job. `None` when nothing is due.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<Option<JobReport>, QueueError> {
        let Some(job) = self.queue.dequeue(&JobKind::ALL, self.clock.now()).await? else {
            return Ok(None);
        };

        let ctx = RequestContext::system(CorrelationId::new()).with_cancel(cancel.child_token());
        tracing::debug!(
            job_id = %job.id,
            kind = %job.kind,
            attempt = job.attempts + 1,
            correlation_id = %ctx.correlation_id,
            "Running job"
        );

        let outcome = match self.dispatch(&ctx, &job).await {
            Ok(()) => {
                self.queue.complete(job.id).await?;
                JobOutcome::Completed
            }
            Err(JobError::InvalidPayload(message)) => {
                tracing::error!(job_id = %job.id, kind = %job.kind, error = %message, "Job payload rejected");
                self.queue.dead_letter(job.id, &message).await?;
                JobOutcome::DeadLettered
            }
            Err(e) => self.fail(&job, &e.to_string()).await?,
        };

        Ok(Some(JobReport {
            id: job.id,
            kind: job.kind,
            outcome,
        }))
    }

    async fn dispatch(&self, ctx: &RequestContext, job: &Job) -> Result<(), JobError> {
        match job.kind {
            JobKind::AdvanceIfReady => {
                let payload: AdvancePayload = decode_payload(job)?;
                let outcome = self
                    .advancer
                    .advance_if_ready(ctx, payload.game_instance_id, payload.turn_number)
                    .await
                    .map_err(|e| JobError::Failed(e.to_string()))?;
                tracing::debug!(job_id = %job.id, ?outcome, "Advance check finished");
            }
            JobKind::RenderSheet => {
                let payload: RenderPayload = decode_payload(job)?;
                self.renderer
                    .render_sheet(ctx, payload.turn_sheet_id)
                    .await
                    .map_err(|e| JobError::Failed(e.to_string()))?;
            }
            JobKind::JoinPlayer => {
                let payload: JoinPayload = decode_payload(job)?;
                self.enrollment
                    .enroll(ctx, payload.join_submission_id)
                    .await
                    .map_err(|e| JobError::Failed(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn fail(&self, job: &Job, error: &str) -> Result<JobOutcome, QueueError> {
        let attempt = job.attempts + 1;
        if attempt >= self.retry.max_attempts {
            tracing::error!(
                job_id = %job.id,
                kind = %job.kind,
                attempts = attempt,
                error,
                "Job dead-lettered"
            );
            self.queue.dead_letter(job.id, error).await?;
            return Ok(JobOutcome::DeadLettered);
        }

        let delay = self.retry.backoff_ms(attempt);
        let spread = self.retry.jitter_range_ms(delay);
        let jitter = if spread > 0 {
            self.random.gen_range(-spread, spread)
        } else {
            0
        };
        let delay_ms = (delay as i64).saturating_add(jitter).max(0);
        let run_at = self.clock.now() + chrono::Duration::milliseconds(delay_ms);

        tracing::warn!(
            job_id = %job.id,
            kind = %job.kind,
            attempt,
            delay_ms,
            error,
            "Job failed, retrying"
        );
        self.queue.retry(job.id, error, run_at).await?;
        Ok(JobOutcome::Retried { run_at })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Jobs enqueued by one sweep. Duplicates of existing jobs are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub advances: usize,
    pub renders: usize,
    pub joins: usize,
}

/// Enqueues an advance check for every started instance past its deadline,
/// and recovers render and join jobs lost after their commit.
pub struct DeadlineSweeper {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueuePort>,
    clock: Arc<dyn ClockPort>,
    /// Rows younger than this are left to the enqueue that follows their commit.
    grace: chrono::Duration,
}

impl DeadlineSweeper {
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<dyn JobQueuePort>,
        clock: Arc<dyn ClockPort>,
        grace: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            clock,
            grace: chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::days(1)),
        }
    }

    pub async fn run(&self, every: Duration, cancel: CancellationToken) {
        tracing::info!(every_secs = every.as_secs(), "Starting deadline sweeper");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(every) => {}
            }
            if let Err(e) = self.sweep_once().await {
                tracing::error!(error = %e, "Deadline sweep failed");
            }
        }
    }

    pub async fn sweep_once(&self) -> Result<SweepReport, SweepError> {
        let ctx = RequestContext::system(CorrelationId::new());
        let now = self.clock.now();
        let settled = now.checked_sub_signed(self.grace).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut tx = self.store.begin(&ctx.scope).await?;
        let overdue = tx.list_overdue_instances(now).await?;
        let unprinted = tx.list_unprinted_sheets(settled).await?;
        let received = tx.list_received_join_submissions(settled).await?;
        drop(tx);

        let advances = self.enqueue_overdue(&overdue).await?;
        let sheets: Vec<_> = unprinted.iter().map(|sheet| sheet.id()).collect();
        let renders = enqueue_renders(self.queue.as_ref(), &sheets).await;
        let mut joins = 0;
        for submission in &received {
            match enqueue_join(self.queue.as_ref(), submission.id).await {
                Ok(Some(_)) => joins += 1,
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    join_submission_id = %submission.id,
                    error = %e,
                    "Failed to re-enqueue join"
                ),
            }
        }
        if renders > 0 || joins > 0 {
            tracing::info!(renders, joins, "Recovered lost follow-up jobs");
        }
        Ok(SweepReport {
            advances,
            renders,
            joins,
        })
    }

    async fn enqueue_overdue(
        &self,
        overdue: &[GameInstance],
    ) -> Result<usize, SweepError> {
        let mut enqueued = 0;
        for instance in overdue {
            let Some(deadline) = instance.turn_deadline_at() else {
                continue;
            };
            let tag = deadline_advance_tag(instance.id(), instance.current_turn(), deadline);
            if enqueue_advance(
                self.queue.as_ref(),
                instance.id(),
                instance.current_turn(),
                &tag,
            )
            .await?
            .is_some()
            {
                enqueued += 1;
            }
        }
        if enqueued > 0 {
            tracing::info!(enqueued, "Enqueued overdue advance checks");
        }
        Ok(enqueued)
    }
}
