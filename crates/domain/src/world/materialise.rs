//! Building the live world when an instance starts

use chrono::{DateTime, Utc};

use crate::entities::{
    Character, CharacterInstance, CreatureInstance, ItemInstance, ItemPosition, LocationInstance,
    CHARACTER_STARTING_HEALTH,
};
use crate::error::DomainError;
use crate::ids::{
    CharacterInstanceId, CreatureInstanceId, GameInstanceId, ItemInstanceId, LocationInstanceId,
};
use crate::world::{AuthoredWorld, LiveWorld};

/// Materialise the initial live world of an instance.
///
/// One location instance per authored location. Each placement rolls once per
/// unit of `quantity`; a unit spawns when `roll() < spawn_chance`. Placements
/// are visited in id order so a seeded `roll` reproduces the same world.
/// Characters start at the first starting location by name.
///
/// `roll` must yield values in `[0, 1)`.
pub fn materialise(
    world: &AuthoredWorld,
    game_instance_id: GameInstanceId,
    characters: &[Character],
    roll: &mut dyn FnMut() -> f64,
    now: DateTime<Utc>,
) -> Result<LiveWorld, DomainError> {
    let mut live = LiveWorld::default();

    let mut locations: Vec<_> = world.locations.iter().collect();
    locations.sort_by_key(|l| l.id);
    for location in locations {
        live.locations.push(LocationInstance {
            id: LocationInstanceId::new(),
            game_instance_id,
            location_id: location.id,
            created_at: now,
            updated_at: now,
        });
    }

    let mut creature_placements: Vec<_> = world.creature_placements.iter().collect();
    creature_placements.sort_by_key(|p| p.id);
    for placement in creature_placements {
        let creature = world
            .creature(placement.creature_id)
            .ok_or_else(|| DomainError::not_found("Creature", placement.creature_id.to_string()))?;
        let location_instance_id = placed_at(&live, placement.location_id)?;
        for _ in 0..placement.quantity {
            if placement.spawn_chance.admits(roll()) {
                live.creatures.push(CreatureInstance {
                    id: CreatureInstanceId::new(),
                    game_instance_id,
                    creature_id: creature.id,
                    location_instance_id,
                    health: creature.max_health,
                    defeatable: creature.is_defeatable(),
                    created_at: now,
                    updated_at: now,
                });
            }
        }
    }

    let mut item_placements: Vec<_> = world.item_placements.iter().collect();
    item_placements.sort_by_key(|p| p.id);
    for placement in item_placements {
        let location_instance_id = placed_at(&live, placement.location_id)?;
        for _ in 0..placement.quantity {
            if placement.spawn_chance.admits(roll()) {
                live.items.push(ItemInstance {
                    id: ItemInstanceId::new(),
                    game_instance_id,
                    item_id: placement.item_id,
                    position: ItemPosition::AtLocation(location_instance_id),
                    created_at: now,
                    updated_at: now,
                });
            }
        }
    }

    if !characters.is_empty() {
        let start = world
            .starting_locations()
            .first()
            .map(|l| l.id)
            .ok_or_else(|| DomainError::constraint("the game has no starting location"))?;
        let start_instance = placed_at(&live, start)?;

        let mut ordered: Vec<&Character> = characters.iter().collect();
        ordered.sort_by_key(|c| (c.account_id, c.id));
        for character in ordered {
            live.characters.push(CharacterInstance {
                id: CharacterInstanceId::new(),
                game_instance_id,
                character_id: character.id,
                account_id: character.account_id,
                location_instance_id: start_instance,
                health: CHARACTER_STARTING_HEALTH,
                created_at: now,
                updated_at: now,
            });
        }
    }

    Ok(live)
}

fn placed_at(
    live: &LiveWorld,
    location_id: crate::ids::LocationId,
) -> Result<LocationInstanceId, DomainError> {
    live.location_instance_of(location_id)
        .map(|l| l.id)
        .ok_or_else(|| DomainError::not_found("Location", location_id.to_string()))
}
