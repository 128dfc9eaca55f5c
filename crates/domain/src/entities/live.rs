//! Live world entities owned by a game instance
//!
//! Each row references its authored template and carries runtime state.
//! Rows reference their instance only; the game is reached through it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{
    AccountId, CharacterId, CharacterInstanceId, CreatureId, CreatureInstanceId, GameInstanceId,
    ItemId, ItemInstanceId, LocationId, LocationInstanceId,
};

/// Health a character instance starts with.
pub const CHARACTER_STARTING_HEALTH: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationInstance {
    pub id: LocationInstanceId,
    pub game_instance_id: GameInstanceId,
    pub location_id: LocationId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatureInstance {
    pub id: CreatureInstanceId,
    pub game_instance_id: GameInstanceId,
    pub creature_id: CreatureId,
    pub location_instance_id: LocationInstanceId,
    pub health: u32,
    /// False for creatures authored with zero health; they never take damage.
    pub defeatable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreatureInstance {
    pub fn is_alive(&self) -> bool {
        !self.defeatable || self.health > 0
    }

    pub fn take_damage(&mut self, amount: u32, now: DateTime<Utc>) {
        if self.defeatable && amount > 0 {
            self.health = self.health.saturating_sub(amount);
            self.updated_at = now;
        }
    }
}

/// Where an item instance currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ItemPosition {
    AtLocation(LocationInstanceId),
    HeldBy(CharacterInstanceId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInstance {
    pub id: ItemInstanceId,
    pub game_instance_id: GameInstanceId,
    pub item_id: ItemId,
    pub position: ItemPosition,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ItemInstance {
    pub fn is_unowned_at(&self, location: LocationInstanceId) -> bool {
        self.position == ItemPosition::AtLocation(location)
    }

    pub fn owner(&self) -> Option<CharacterInstanceId> {
        match self.position {
            ItemPosition::HeldBy(owner) => Some(owner),
            ItemPosition::AtLocation(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterInstance {
    pub id: CharacterInstanceId,
    pub game_instance_id: GameInstanceId,
    pub character_id: CharacterId,
    pub account_id: AccountId,
    pub location_instance_id: LocationInstanceId,
    pub health: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CharacterInstance {
    /// Characters at zero health are out of the game.
    pub fn is_active(&self) -> bool {
        self.health > 0
    }

    pub fn take_damage(&mut self, amount: u32, now: DateTime<Utc>) {
        if amount > 0 {
            self.health = self.health.saturating_sub(amount);
            self.updated_at = now;
        }
    }
}
