//! Creature entity - template for live creature instances

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;
use crate::ids::{CreatureId, GameId};
use crate::value_objects::{CreatureName, Description};

/// How a creature reacts to characters sharing its location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Aggressive,
    Inquisitive,
    Indifferent,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aggressive => "aggressive",
            Self::Inquisitive => "inquisitive",
            Self::Indifferent => "indifferent",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Disposition {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aggressive" => Ok(Self::Aggressive),
            "inquisitive" => Ok(Self::Inquisitive),
            "indifferent" => Ok(Self::Indifferent),
            other => Err(DomainError::parse(format!("Invalid disposition: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creature {
    pub id: CreatureId,
    pub game_id: GameId,
    pub name: CreatureName,
    pub description: Description,
    pub disposition: Disposition,
    /// Zero means the creature cannot be defeated.
    pub max_health: u32,
    pub attack_damage: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Creature {
    pub fn new(
        game_id: GameId,
        name: CreatureName,
        disposition: Disposition,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CreatureId::new(),
            game_id,
            name,
            description: Description::empty(),
            disposition,
            max_health: 5,
            attack_damage: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_stats(mut self, max_health: u32, attack_damage: u32) -> Self {
        self.max_health = max_health;
        self.attack_damage = attack_damage;
        self
    }

    pub fn is_defeatable(&self) -> bool {
        self.max_health > 0
    }
}
