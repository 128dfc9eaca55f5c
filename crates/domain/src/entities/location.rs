//! Locations, the links between them, and link requirements

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{CreatureId, GameId, ItemId, LinkRequirementId, LocationId, LocationLinkId};
use crate::value_objects::{Description, LinkName, LocationName};

/// A named place in a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub game_id: GameId,
    pub name: LocationName,
    pub description: Description,
    /// New characters are placed at a starting location.
    pub is_starting_location: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Location {
    pub fn new(game_id: GameId, name: LocationName, now: DateTime<Utc>) -> Self {
        Self {
            id: LocationId::new(),
            game_id,
            name,
            description: Description::empty(),
            is_starting_location: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: Description) -> Self {
        self.description = description;
        self
    }

    pub fn starting(mut self) -> Self {
        self.is_starting_location = true;
        self
    }
}

/// A directed edge between two locations of the same game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationLink {
    pub id: LocationLinkId,
    pub game_id: GameId,
    pub from_location_id: LocationId,
    pub to_location_id: LocationId,
    pub name: LinkName,
    pub description: Description,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LocationLink {
    pub fn new(
        from: &Location,
        to: &Location,
        name: LinkName,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if from.game_id != to.game_id {
            return Err(DomainError::constraint(
                "A link must join two locations of the same game",
            ));
        }
        if from.id == to.id {
            return Err(DomainError::constraint("A link cannot loop onto its origin"));
        }
        Ok(Self {
            id: LocationLinkId::new(),
            game_id: from.game_id,
            from_location_id: from.id,
            to_location_id: to.id,
            name,
            description: Description::empty(),
            created_at: now,
            updated_at: now,
        })
    }
}

/// What a character needs to traverse a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequirementKind {
    /// The character holds at least `quantity` instances of the item.
    Item { item_id: ItemId, quantity: u32 },
    /// No living instance of the creature is at the link's origin.
    CreatureAbsent { creature_id: CreatureId },
}

/// A gate on a location link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRequirement {
    pub id: LinkRequirementId,
    pub game_id: GameId,
    pub location_link_id: LocationLinkId,
    pub kind: RequirementKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LinkRequirement {
    pub fn new(link: &LocationLink, kind: RequirementKind, now: DateTime<Utc>) -> Self {
        Self {
            id: LinkRequirementId::new(),
            game_id: link.game_id,
            location_link_id: link.id,
            kind,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_rejects_locations_from_other_games() {
        let now = Utc::now();
        let a = Location::new(GameId::new(), LocationName::new("A").unwrap(), now);
        let b = Location::new(GameId::new(), LocationName::new("B").unwrap(), now);
        let err = LocationLink::new(&a, &b, LinkName::new("Road").unwrap(), now).unwrap_err();
        assert!(matches!(err, DomainError::Constraint(_)));
    }

    #[test]
    fn requirement_kind_serializes_with_tag() {
        let kind = RequirementKind::Item {
            item_id: ItemId::new(),
            quantity: 2,
        };
        let json = serde_json::to_value(kind).unwrap();
        assert_eq!(json["kind"], "item");
        assert_eq!(json["quantity"], 2);
    }
}
