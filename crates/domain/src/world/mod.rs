//! The authored world of a game and the live world of an instance
//!
//! Everything here is pure: callers load the rows, these functions decide
//! what happens, callers persist the result.

mod materialise;
mod readiness;
mod rules;
mod sheets;

pub use materialise::materialise;
pub use readiness::{check_readiness, ReadinessIssue};
pub use rules::{
    apply_location_choice, encounter_rule, is_link_admissible, resolve_end_of_turn,
    EncounterRule, MoveOutcome, TurnEvent, CHARACTER_STRIKE_DAMAGE,
};
pub use sheets::location_choice_sheet_data;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::entities::{
    CharacterInstance, Creature, CreatureInstance, CreaturePlacement, Game, Item, ItemInstance,
    ItemPlacement, LinkRequirement, Location, LocationInstance, LocationLink,
};
use crate::error::DomainError;
use crate::ids::{
    CharacterInstanceId, CreatureId, ItemId, LocationId, LocationInstanceId, LocationLinkId,
};

/// Everything a designer authored for one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthoredWorld {
    pub game: Game,
    pub locations: Vec<Location>,
    pub links: Vec<LocationLink>,
    pub requirements: Vec<LinkRequirement>,
    pub creatures: Vec<Creature>,
    pub items: Vec<Item>,
    pub creature_placements: Vec<CreaturePlacement>,
    pub item_placements: Vec<ItemPlacement>,
}

impl AuthoredWorld {
    pub fn empty(game: Game) -> Self {
        Self {
            game,
            locations: Vec::new(),
            links: Vec::new(),
            requirements: Vec::new(),
            creatures: Vec::new(),
            items: Vec::new(),
            creature_placements: Vec::new(),
            item_placements: Vec::new(),
        }
    }

    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.locations.iter().find(|l| l.id == id)
    }

    pub fn link(&self, id: LocationLinkId) -> Option<&LocationLink> {
        self.links.iter().find(|l| l.id == id)
    }

    pub fn creature(&self, id: CreatureId) -> Option<&Creature> {
        self.creatures.iter().find(|c| c.id == id)
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Outbound links of a location, ordered by name then id.
    pub fn links_from(&self, location_id: LocationId) -> Vec<&LocationLink> {
        let mut links: Vec<&LocationLink> = self
            .links
            .iter()
            .filter(|l| l.from_location_id == location_id)
            .collect();
        links.sort_by(|a, b| (a.name.as_str(), a.id).cmp(&(b.name.as_str(), b.id)));
        links
    }

    pub fn requirements_for(
        &self,
        link_id: LocationLinkId,
    ) -> impl Iterator<Item = &LinkRequirement> {
        self.requirements
            .iter()
            .filter(move |r| r.location_link_id == link_id)
    }

    /// Starting locations ordered by name then id.
    pub fn starting_locations(&self) -> Vec<&Location> {
        let mut starts: Vec<&Location> = self
            .locations
            .iter()
            .filter(|l| l.is_starting_location)
            .collect();
        starts.sort_by(|a, b| (a.name.as_str(), a.id).cmp(&(b.name.as_str(), b.id)));
        starts
    }

    /// Check every row belongs to this game and every reference resolves.
    pub fn validate(&self) -> Result<(), DomainError> {
        let game_id = self.game.id;
        let foreign = self.locations.iter().any(|r| r.game_id != game_id)
            || self.links.iter().any(|r| r.game_id != game_id)
            || self.requirements.iter().any(|r| r.game_id != game_id)
            || self.creatures.iter().any(|r| r.game_id != game_id)
            || self.items.iter().any(|r| r.game_id != game_id)
            || self.creature_placements.iter().any(|r| r.game_id != game_id)
            || self.item_placements.iter().any(|r| r.game_id != game_id);
        if foreign {
            return Err(DomainError::constraint(format!(
                "world contains rows that do not belong to game {}",
                game_id
            )));
        }

        let locations: HashSet<LocationId> = self.locations.iter().map(|l| l.id).collect();
        let links: HashSet<LocationLinkId> = self.links.iter().map(|l| l.id).collect();
        let creatures: HashSet<CreatureId> = self.creatures.iter().map(|c| c.id).collect();
        let items: HashSet<ItemId> = self.items.iter().map(|i| i.id).collect();

        for link in &self.links {
            if !locations.contains(&link.from_location_id)
                || !locations.contains(&link.to_location_id)
            {
                return Err(DomainError::constraint(format!(
                    "link {} joins a location outside the game",
                    link.id
                )));
            }
        }
        for requirement in &self.requirements {
            if !links.contains(&requirement.location_link_id) {
                return Err(DomainError::constraint(format!(
                    "requirement {} gates an unknown link",
                    requirement.id
                )));
            }
        }
        for placement in &self.creature_placements {
            if !locations.contains(&placement.location_id)
                || !creatures.contains(&placement.creature_id)
            {
                return Err(DomainError::constraint(format!(
                    "creature placement {} references an unknown row",
                    placement.id
                )));
            }
        }
        for placement in &self.item_placements {
            if !locations.contains(&placement.location_id) || !items.contains(&placement.item_id) {
                return Err(DomainError::constraint(format!(
                    "item placement {} references an unknown row",
                    placement.id
                )));
            }
        }
        Ok(())
    }
}

/// The runtime rows of one game instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveWorld {
    pub locations: Vec<LocationInstance>,
    pub creatures: Vec<CreatureInstance>,
    pub items: Vec<ItemInstance>,
    pub characters: Vec<CharacterInstance>,
}

impl LiveWorld {
    pub fn location_instance(&self, id: LocationInstanceId) -> Option<&LocationInstance> {
        self.locations.iter().find(|l| l.id == id)
    }

    pub fn location_instance_of(&self, location_id: LocationId) -> Option<&LocationInstance> {
        self.locations.iter().find(|l| l.location_id == location_id)
    }

    pub fn character(&self, id: CharacterInstanceId) -> Option<&CharacterInstance> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn character_mut(&mut self, id: CharacterInstanceId) -> Option<&mut CharacterInstance> {
        self.characters.iter_mut().find(|c| c.id == id)
    }

    /// Characters that still receive sheets, ordered by account then id.
    pub fn active_characters(&self) -> Vec<&CharacterInstance> {
        let mut active: Vec<&CharacterInstance> =
            self.characters.iter().filter(|c| c.is_active()).collect();
        active.sort_by_key(|c| (c.account_id, c.id));
        active
    }

    /// How many instances of `item_id` a character holds.
    pub fn held_count(&self, character: CharacterInstanceId, item_id: ItemId) -> u32 {
        let held = self
            .items
            .iter()
            .filter(|i| i.item_id == item_id && i.owner() == Some(character))
            .count();
        u32::try_from(held).unwrap_or(u32::MAX)
    }

    pub fn living_creatures_at(
        &self,
        location: LocationInstanceId,
    ) -> impl Iterator<Item = &CreatureInstance> {
        self.creatures
            .iter()
            .filter(move |c| c.location_instance_id == location && c.is_alive())
    }
}
