//! Background job payloads and idempotency tags.
//!
//! A tag names the effect a job produces, so enqueueing the same effect twice
//! is a no-op at the queue.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use playbymail_domain::{GameInstanceId, JobId, JoinSubmissionId, TurnSheetId};

use crate::infrastructure::ports::{Job, JobKind, JobQueuePort, QueueError};
use crate::use_cases::error::JobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancePayload {
    pub game_instance_id: GameInstanceId,
    pub turn_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderPayload {
    pub turn_sheet_id: TurnSheetId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPayload {
    pub join_submission_id: JoinSubmissionId,
}

/// Advance check triggered by a processed sheet.
pub fn upload_advance_tag(turn_sheet_id: TurnSheetId, turn_number: u32) -> String {
    format!("advance:{}:{}", turn_sheet_id, turn_number)
}

/// Advance check triggered by a resumed instance.
pub fn resume_advance_tag(
    instance_id: GameInstanceId,
    turn_number: u32,
    resumed_at: DateTime<Utc>,
) -> String {
    format!(
        "resume:{}:{}:{}",
        instance_id,
        turn_number,
        resumed_at.timestamp_millis()
    )
}

/// Advance check triggered by an elapsed turn deadline.
pub fn deadline_advance_tag(
    instance_id: GameInstanceId,
    turn_number: u32,
    deadline: DateTime<Utc>,
) -> String {
    format!(
        "deadline:{}:{}:{}",
        instance_id,
        turn_number,
        deadline.timestamp_millis()
    )
}

pub fn render_tag(turn_sheet_id: TurnSheetId) -> String {
    format!("render:{}", turn_sheet_id)
}

pub fn join_tag(join_submission_id: JoinSubmissionId) -> String {
    format!("join:{}", join_submission_id)
}

fn to_payload<T: Serialize>(payload: &T) -> Result<serde_json::Value, QueueError> {
    serde_json::to_value(payload).map_err(QueueError::new)
}

/// Parse a claimed job's payload.
pub fn decode_payload<T: DeserializeOwned>(job: &Job) -> Result<T, JobError> {
    serde_json::from_value(job.payload.clone())
        .map_err(|e| JobError::InvalidPayload(format!("{} job {}: {}", job.kind, job.id, e)))
}

pub(crate) async fn enqueue_advance(
    queue: &dyn JobQueuePort,
    game_instance_id: GameInstanceId,
    turn_number: u32,
    tag: &str,
) -> Result<Option<JobId>, QueueError> {
    let payload = to_payload(&AdvancePayload {
        game_instance_id,
        turn_number,
    })?;
    let enqueued = queue.enqueue(JobKind::AdvanceIfReady, payload, tag).await?;
    tracing::debug!(
        instance_id = %game_instance_id,
        turn = turn_number,
        tag,
        duplicate = enqueued.is_none(),
        "Enqueued advance check"
    );
    Ok(enqueued)
}

pub(crate) async fn enqueue_join(
    queue: &dyn JobQueuePort,
    join_submission_id: JoinSubmissionId,
) -> Result<Option<JobId>, QueueError> {
    let payload = to_payload(&JoinPayload { join_submission_id })?;
    queue
        .enqueue(JobKind::JoinPlayer, payload, &join_tag(join_submission_id))
        .await
}

/// Enqueue a render job per sheet.
///
/// Runs after the sheets are committed. A failed enqueue is logged and
/// skipped; the deadline sweeper enqueues it again.
pub(crate) async fn enqueue_renders(queue: &dyn JobQueuePort, sheets: &[TurnSheetId]) -> usize {
    let mut enqueued = 0;
    for &turn_sheet_id in sheets {
        let result = match to_payload(&RenderPayload { turn_sheet_id }) {
            Ok(payload) => {
                queue
                    .enqueue(JobKind::RenderSheet, payload, &render_tag(turn_sheet_id))
                    .await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(Some(_)) => enqueued += 1,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(turn_sheet_id = %turn_sheet_id, error = %e, "Failed to enqueue render");
            }
        }
    }
    enqueued
}
