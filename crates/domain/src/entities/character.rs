//! Character entity - a player's avatar in a game

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, CharacterId, GameId};
use crate::value_objects::CharacterName;

/// A player's avatar template. One per account per game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub game_id: GameId,
    pub account_id: AccountId,
    pub name: CharacterName,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Character {
    pub fn new(
        game_id: GameId,
        account_id: AccountId,
        name: CharacterName,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CharacterId::new(),
            game_id,
            account_id,
            name,
            created_at: now,
            updated_at: now,
        }
    }
}
