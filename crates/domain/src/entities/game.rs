//! Game entity - an authored adventure world

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;
use crate::ids::GameId;
use crate::value_objects::{Description, GameName};

/// Publication state of a game. Publication is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Draft,
    Published,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            other => Err(DomainError::parse(format!("Invalid game status: {}", other))),
        }
    }
}

/// An authored game.
///
/// Only `draft` games accept authoring changes; callers check
/// [`Game::ensure_draft`] before mutating anything the game owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub name: GameName,
    pub description: Description,
    pub status: GameStatus,
    /// Hours a turn stays open before outstanding sheets are abandoned.
    pub turn_duration_hours: u32,
    /// Number of turns after which an instance completes. `None` runs forever.
    pub turn_limit: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Game {
    pub const DEFAULT_TURN_DURATION_HOURS: u32 = 168;

    pub fn new(name: GameName, now: DateTime<Utc>) -> Self {
        Self {
            id: GameId::new(),
            name,
            description: Description::empty(),
            status: GameStatus::Draft,
            turn_duration_hours: Self::DEFAULT_TURN_DURATION_HOURS,
            turn_limit: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_turn_limit(mut self, turn_limit: u32) -> Self {
        self.turn_limit = Some(turn_limit);
        self
    }

    pub fn with_turn_duration_hours(mut self, hours: u32) -> Self {
        self.turn_duration_hours = hours;
        self
    }

    pub fn is_published(&self) -> bool {
        self.status == GameStatus::Published
    }

    pub fn ensure_draft(&self) -> Result<(), DomainError> {
        if self.is_published() {
            return Err(DomainError::constraint(format!(
                "Game {} is published and can no longer be edited",
                self.id
            )));
        }
        Ok(())
    }

    /// Publish the game. Publishing twice is a no-op.
    pub fn publish(&mut self, now: DateTime<Utc>) {
        if self.status == GameStatus::Draft {
            self.status = GameStatus::Published;
            self.updated_at = now;
        }
    }
}
