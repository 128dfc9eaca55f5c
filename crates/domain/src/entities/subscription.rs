//! Subscription entity - an account's relation to a game

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;
use crate::ids::{AccountId, GameId, GameInstanceId, SubscriptionId};
use crate::value_objects::SheetToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionKind {
    Designer,
    Manager,
    Player,
}

impl SubscriptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Designer => "designer",
            Self::Manager => "manager",
            Self::Player => "player",
        }
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "designer" => Ok(Self::Designer),
            "manager" => Ok(Self::Manager),
            "player" => Ok(Self::Player),
            other => Err(DomainError::parse(format!(
                "Invalid subscription kind: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub game_id: GameId,
    pub account_id: AccountId,
    pub kind: SubscriptionKind,
    /// Set on player subscriptions once they are bound to an instance.
    pub game_instance_id: Option<GameInstanceId>,
    /// Token printed on this manager's blank join sheets.
    #[serde(default)]
    pub join_code: Option<SheetToken>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(
        game_id: GameId,
        account_id: AccountId,
        kind: SubscriptionKind,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            game_id,
            account_id,
            kind,
            game_instance_id: None,
            join_code: (kind == SubscriptionKind::Manager).then(SheetToken::generate),
            created_at: now,
            updated_at: now,
        }
    }

    /// Player subscription bound to an instance.
    pub fn player_for(
        game_id: GameId,
        account_id: AccountId,
        game_instance_id: GameInstanceId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            game_instance_id: Some(game_instance_id),
            ..Self::new(game_id, account_id, SubscriptionKind::Player, now)
        }
    }

    /// The designer and manager subscriptions minted when a game is created.
    pub fn minted_for_creator(
        game_id: GameId,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> [Subscription; 2] {
        [
            Self::new(game_id, account_id, SubscriptionKind::Designer, now),
            Self::new(game_id, account_id, SubscriptionKind::Manager, now),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn only_managers_carry_a_join_code() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let [designer, manager] = Subscription::minted_for_creator(GameId::new(), AccountId::new(), now);
        assert!(designer.join_code.is_none());
        assert!(manager.join_code.is_some());

        let player =
            Subscription::player_for(GameId::new(), AccountId::new(), GameInstanceId::new(), now);
        assert!(player.join_code.is_none());
    }
}
