//! Item entity - template for live item instances

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{GameId, ItemId};
use crate::value_objects::{Description, ItemName};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub game_id: GameId,
    pub name: ItemName,
    pub description: Description,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn new(game_id: GameId, name: ItemName, now: DateTime<Utc>) -> Self {
        Self {
            id: ItemId::new(),
            game_id,
            name,
            description: Description::empty(),
            created_at: now,
            updated_at: now,
        }
    }
}
