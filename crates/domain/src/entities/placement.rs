//! Placements - authored spawn rules
//!
//! A placement says "at location L, spawn up to N of template T", each unit
//! rolled independently against the spawn chance when an instance starts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CreatureId, CreaturePlacementId, GameId, ItemId, ItemPlacementId, LocationId};
use crate::value_objects::SpawnChance;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreaturePlacement {
    pub id: CreaturePlacementId,
    pub game_id: GameId,
    pub creature_id: CreatureId,
    pub location_id: LocationId,
    pub quantity: u32,
    pub spawn_chance: SpawnChance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreaturePlacement {
    pub fn new(
        game_id: GameId,
        creature_id: CreatureId,
        location_id: LocationId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CreaturePlacementId::new(),
            game_id,
            creature_id,
            location_id,
            quantity,
            spawn_chance: SpawnChance::ALWAYS,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_chance(mut self, spawn_chance: SpawnChance) -> Self {
        self.spawn_chance = spawn_chance;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPlacement {
    pub id: ItemPlacementId,
    pub game_id: GameId,
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub quantity: u32,
    pub spawn_chance: SpawnChance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ItemPlacement {
    pub fn new(
        game_id: GameId,
        item_id: ItemId,
        location_id: LocationId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ItemPlacementId::new(),
            game_id,
            item_id,
            location_id,
            quantity,
            spawn_chance: SpawnChance::ALWAYS,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_chance(mut self, spawn_chance: SpawnChance) -> Self {
        self.spawn_chance = spawn_chance;
        self
    }
}
