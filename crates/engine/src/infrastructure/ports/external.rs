//! External service port traits (vision, renderer, job queue, account directory).

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use playbymail_domain::{AccountId, JobId, JoinAnswers, MimeType, Region, SheetType};

use super::error::{DirectoryError, QueueError, RenderError, ScanError};

// =============================================================================
// Vision
// =============================================================================

/// Text read from one region of a scanned sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldReading {
    pub text: String,
    /// OCR confidence in `[0, 1]`.
    pub confidence: f64,
}

/// OCR and mark detection over a scanned page image.
///
/// Regions are expressed as fractions of the page.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisionPort: Send + Sync {
    /// Find and read the printed sheet code anywhere on the page.
    async fn read_code(&self, image: &[u8]) -> Result<String, ScanError>;

    /// Fill ratio in `[0, 1]` for each region, in order.
    async fn detect_marks(&self, image: &[u8], regions: &[Region]) -> Result<Vec<f64>, ScanError>;

    /// Handwritten text for each region, in order.
    async fn read_fields(
        &self,
        image: &[u8],
        regions: &[Region],
    ) -> Result<Vec<FieldReading>, ScanError>;
}

// =============================================================================
// Renderer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundImage {
    pub mime_type: MimeType,
    pub bytes: Vec<u8>,
}

/// Everything the renderer needs to lay out one printable sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub sheet_type: SheetType,
    pub sheet_code: String,
    pub layout: serde_json::Value,
    pub sheet_data: serde_json::Value,
    pub background: Option<BackgroundImage>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RendererPort: Send + Sync {
    /// Render a sheet to PDF bytes.
    async fn render(&self, request: RenderRequest) -> Result<Vec<u8>, RenderError>;
}

// =============================================================================
// Job queue
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    AdvanceIfReady,
    RenderSheet,
    JoinPlayer,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [
        JobKind::AdvanceIfReady,
        JobKind::RenderSheet,
        JobKind::JoinPlayer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdvanceIfReady => "advance-if-ready",
            Self::RenderSheet => "render-sheet",
            Self::JoinPlayer => "join-player",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| QueueError::new(format!("Unknown job kind: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    DeadLettered,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::DeadLettered => "dead_lettered",
        }
    }
}

impl FromStr for JobStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "dead_lettered" => Ok(Self::DeadLettered),
            other => Err(QueueError::new(format!("Unknown job status: {}", other))),
        }
    }
}

/// A claimed job.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub tag: String,
    /// Attempts made before this one.
    pub attempts: u32,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub dead_lettered: u64,
}

/// Durable, at-least-once job queue.
///
/// Each job carries an idempotency tag; enqueueing a tag that already exists
/// is a no-op.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueuePort: Send + Sync {
    /// Returns `None` when a job with this tag already exists.
    async fn enqueue(
        &self,
        kind: JobKind,
        payload: serde_json::Value,
        tag: &str,
    ) -> Result<Option<JobId>, QueueError>;

    /// Claim the oldest due job of one of `kinds`.
    async fn dequeue(
        &self,
        kinds: &[JobKind],
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, QueueError>;

    async fn complete(&self, id: JobId) -> Result<(), QueueError>;

    /// Return the job to the queue, due again at `run_at`.
    async fn retry(
        &self,
        id: JobId,
        error: &str,
        run_at: DateTime<Utc>,
    ) -> Result<(), QueueError>;

    async fn dead_letter(&self, id: JobId, error: &str) -> Result<(), QueueError>;

    async fn counts(&self) -> Result<JobCounts, QueueError>;
}

// =============================================================================
// Account directory
// =============================================================================

/// The external account service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountDirectoryPort: Send + Sync {
    /// Find the account registered under the answers' e-mail, creating one
    /// when none exists.
    async fn resolve_account(&self, answers: &JoinAnswers) -> Result<AccountId, DirectoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_kinds_parse_their_wire_names() {
        for kind in JobKind::ALL {
            assert_eq!(kind.as_str().parse::<JobKind>().unwrap(), kind);
        }
        assert!("send-email".parse::<JobKind>().is_err());
    }
}
