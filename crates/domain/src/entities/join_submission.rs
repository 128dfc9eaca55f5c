//! Join submissions - scanned "come play" sheets awaiting enrolment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;
use crate::ids::{AccountId, GameId, GameInstanceId, JoinSubmissionId, SubscriptionId};
use crate::sheets::JoinAnswers;
use crate::value_objects::ScanQuality;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinSubmissionStatus {
    Received,
    Enrolled,
    Rejected,
}

impl JoinSubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Enrolled => "enrolled",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for JoinSubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JoinSubmissionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(Self::Received),
            "enrolled" => Ok(Self::Enrolled),
            "rejected" => Ok(Self::Rejected),
            other => Err(DomainError::parse(format!(
                "Invalid join submission status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSubmission {
    pub id: JoinSubmissionId,
    pub game_id: GameId,
    pub manager_subscription_id: SubscriptionId,
    pub answers: JoinAnswers,
    pub scan_quality: ScanQuality,
    /// Hex sha256 of the scanned image.
    pub image_digest: String,
    pub status: JoinSubmissionStatus,
    pub account_id: Option<AccountId>,
    pub game_instance_id: Option<GameInstanceId>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JoinSubmission {
    pub fn received(
        game_id: GameId,
        manager_subscription_id: SubscriptionId,
        answers: JoinAnswers,
        scan_quality: ScanQuality,
        image_digest: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JoinSubmissionId::new(),
            game_id,
            manager_subscription_id,
            answers,
            scan_quality,
            image_digest,
            status: JoinSubmissionStatus::Received,
            account_id: None,
            game_instance_id: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status != JoinSubmissionStatus::Received
    }

    pub fn enroll(
        &mut self,
        account_id: AccountId,
        game_instance_id: GameInstanceId,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_received()?;
        self.status = JoinSubmissionStatus::Enrolled;
        self.account_id = Some(account_id);
        self.game_instance_id = Some(game_instance_id);
        self.updated_at = now;
        Ok(())
    }

    pub fn reject(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_received()?;
        self.status = JoinSubmissionStatus::Rejected;
        self.rejection_reason = Some(reason.into());
        self.updated_at = now;
        Ok(())
    }

    fn ensure_received(&self) -> Result<(), DomainError> {
        if self.is_settled() {
            return Err(DomainError::invalid_state_transition(format!(
                "join submission {} is already {}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}
