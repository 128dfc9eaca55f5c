//! GameInstance aggregate - the live play-through state machine
//!
//! ```text
//! created --start--> started --pause--> paused --resume--> started
//!                       |
//!                       +--(last turn applied)--> completed
//! any non-terminal --cancel--> cancelled
//! ```
//!
//! `current_turn` is zero exactly while the instance is `created`, and only
//! ever increases. The turn counter moves through [`GameInstance::advance_turn`]
//! alone.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::entities::Game;
use crate::error::DomainError;
use crate::ids::{GameId, GameInstanceId, SubscriptionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Created,
    Started,
    Paused,
    Completed,
    Cancelled,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "started" => Ok(Self::Started),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::parse(format!(
                "Invalid instance status: {}",
                other
            ))),
        }
    }
}

/// Manager-triggered transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceAction {
    Start,
    Pause,
    Resume,
    Cancel,
}

impl InstanceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for InstanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnAdvance {
    /// Play continues; the payload is the new current turn.
    Next(u32),
    /// The last configured turn was applied; the instance is completed.
    Completed(u32),
}

/// Flat persistence form of [`GameInstance`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameInstanceRecord {
    pub id: GameInstanceId,
    pub game_id: GameId,
    pub manager_subscription_id: SubscriptionId,
    pub status: InstanceStatus,
    pub current_turn: u32,
    pub turn_limit: Option<u32>,
    pub turn_duration_hours: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub last_turn_at: Option<DateTime<Utc>>,
    pub turn_deadline_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A live play-through of a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GameInstanceRecord", into = "GameInstanceRecord")]
pub struct GameInstance {
    id: GameInstanceId,
    game_id: GameId,
    manager_subscription_id: SubscriptionId,
    status: InstanceStatus,
    current_turn: u32,
    turn_limit: Option<u32>,
    turn_duration_hours: u32,
    started_at: Option<DateTime<Utc>>,
    last_turn_at: Option<DateTime<Utc>>,
    turn_deadline_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GameInstance {
    // =========================================================================
    // Constructor
    // =========================================================================

    /// Create an instance of `game`, copying its turn configuration.
    pub fn new(game: &Game, manager_subscription_id: SubscriptionId, now: DateTime<Utc>) -> Self {
        Self {
            id: GameInstanceId::new(),
            game_id: game.id,
            manager_subscription_id,
            status: InstanceStatus::Created,
            current_turn: 0,
            turn_limit: game.turn_limit,
            turn_duration_hours: game.turn_duration_hours,
            started_at: None,
            last_turn_at: None,
            turn_deadline_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> GameInstanceId {
        self.id
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub fn manager_subscription_id(&self) -> SubscriptionId {
        self.manager_subscription_id
    }

    pub fn status(&self) -> InstanceStatus {
        self.status
    }

    pub fn current_turn(&self) -> u32 {
        self.current_turn
    }

    pub fn turn_limit(&self) -> Option<u32> {
        self.turn_limit
    }

    pub fn turn_duration_hours(&self) -> u32 {
        self.turn_duration_hours
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn last_turn_at(&self) -> Option<DateTime<Utc>> {
        self.last_turn_at
    }

    pub fn turn_deadline_at(&self) -> Option<DateTime<Utc>> {
        self.turn_deadline_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the current turn's deadline has elapsed.
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.turn_deadline_at.is_some_and(|deadline| deadline <= now)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Apply a manager action.
    pub fn apply(
        &mut self,
        action: InstanceAction,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        match action {
            InstanceAction::Start => self.start(now),
            InstanceAction::Pause => self.pause(now),
            InstanceAction::Resume => self.resume(now),
            InstanceAction::Cancel => self.cancel(now),
        }
    }

    /// `created -> started`, opening turn 1.
    ///
    /// Readiness and publication are checked by the caller; this only
    /// enforces the state machine.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.require(InstanceStatus::Created, InstanceStatus::Started)?;
        self.status = InstanceStatus::Started;
        self.current_turn = 1;
        self.started_at = Some(now);
        self.turn_deadline_at = Some(self.deadline_from(now));
        self.updated_at = now;
        Ok(())
    }

    /// `started -> paused`. The deadline is suspended.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.require(InstanceStatus::Started, InstanceStatus::Paused)?;
        self.status = InstanceStatus::Paused;
        self.turn_deadline_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// `paused -> started`. The current turn gets a fresh deadline.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.require(InstanceStatus::Paused, InstanceStatus::Started)?;
        self.status = InstanceStatus::Started;
        self.turn_deadline_at = Some(self.deadline_from(now));
        self.updated_at = now;
        Ok(())
    }

    /// Any non-terminal state `-> cancelled`. The turn counter is kept.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.is_terminal() {
            return Err(self.illegal(InstanceStatus::Cancelled));
        }
        self.status = InstanceStatus::Cancelled;
        self.turn_deadline_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Close turn `turn` and open the next one.
    ///
    /// Fails unless the instance is started and `turn` is the current turn.
    /// When `turn` is the configured last turn the instance completes.
    pub fn advance_turn(
        &mut self,
        turn: u32,
        now: DateTime<Utc>,
    ) -> Result<TurnAdvance, DomainError> {
        if self.status != InstanceStatus::Started {
            return Err(DomainError::invalid_state_transition(format!(
                "cannot advance a {} instance",
                self.status
            )));
        }
        if self.current_turn != turn {
            return Err(DomainError::invalid_state_transition(format!(
                "cannot advance turn {} while the current turn is {}",
                turn, self.current_turn
            )));
        }

        self.current_turn = turn + 1;
        self.last_turn_at = Some(now);
        self.updated_at = now;

        if self.turn_limit.is_some_and(|limit| turn >= limit) {
            self.status = InstanceStatus::Completed;
            self.turn_deadline_at = None;
            return Ok(TurnAdvance::Completed(turn));
        }

        self.turn_deadline_at = Some(self.deadline_from(now));
        Ok(TurnAdvance::Next(self.current_turn))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn deadline_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::hours(i64::from(self.turn_duration_hours))
    }

    fn require(&self, from: InstanceStatus, to: InstanceStatus) -> Result<(), DomainError> {
        if self.status != from {
            return Err(self.illegal(to));
        }
        Ok(())
    }

    fn illegal(&self, to: InstanceStatus) -> DomainError {
        DomainError::invalid_state_transition(format!("{} -> {}", self.status, to))
    }
}

impl From<GameInstance> for GameInstanceRecord {
    fn from(instance: GameInstance) -> Self {
        Self {
            id: instance.id,
            game_id: instance.game_id,
            manager_subscription_id: instance.manager_subscription_id,
            status: instance.status,
            current_turn: instance.current_turn,
            turn_limit: instance.turn_limit,
            turn_duration_hours: instance.turn_duration_hours,
            started_at: instance.started_at,
            last_turn_at: instance.last_turn_at,
            turn_deadline_at: instance.turn_deadline_at,
            created_at: instance.created_at,
            updated_at: instance.updated_at,
        }
    }
}

impl TryFrom<GameInstanceRecord> for GameInstance {
    type Error = DomainError;

    /// Rebuild from storage, rejecting rows that break the turn invariant.
    fn try_from(record: GameInstanceRecord) -> Result<Self, Self::Error> {
        let is_created = record.status == InstanceStatus::Created;
        if is_created != (record.current_turn == 0) {
            return Err(DomainError::constraint(format!(
                "instance {} is {} at turn {}",
                record.id, record.status, record.current_turn
            )));
        }
        Ok(Self {
            id: record.id,
            game_id: record.game_id,
            manager_subscription_id: record.manager_subscription_id,
            status: record.status,
            current_turn: record.current_turn,
            turn_limit: record.turn_limit,
            turn_duration_hours: record.turn_duration_hours,
            started_at: record.started_at,
            last_turn_at: record.last_turn_at,
            turn_deadline_at: record.turn_deadline_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}
