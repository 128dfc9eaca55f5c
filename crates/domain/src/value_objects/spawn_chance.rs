//! Placement spawn probability.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Probability in `[0, 1]` that one unit of a placement spawns.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct SpawnChance(f64);

impl SpawnChance {
    pub const ALWAYS: SpawnChance = SpawnChance(1.0);
    pub const NEVER: SpawnChance = SpawnChance(0.0);

    pub fn new(value: f64) -> Result<Self, DomainError> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(DomainError::validation(format!(
                "Spawn chance must be within [0, 1], got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Whether a roll in `[0, 1)` spawns the unit.
    pub fn admits(&self, roll: f64) -> bool {
        roll < self.0
    }

    pub fn is_possible(&self) -> bool {
        self.0 > 0.0
    }
}

impl Default for SpawnChance {
    fn default() -> Self {
        Self::ALWAYS
    }
}

impl TryFrom<f64> for SpawnChance {
    type Error = DomainError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SpawnChance> for f64 {
    fn from(chance: SpawnChance) -> f64 {
        chance.0
    }
}
