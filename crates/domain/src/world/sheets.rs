//! Building the next turn's sheet payloads from the live world

use crate::entities::CharacterInstance;
use crate::error::DomainError;
use crate::sheets::{LocationChoiceLayout, LocationChoiceSheetData, LocationOption};
use crate::world::{is_link_admissible, AuthoredWorld, LiveWorld};

/// Location choice payload for a character at its current position.
///
/// Only links the character may take right now are offered, in name order,
/// up to the layout's option capacity.
pub fn location_choice_sheet_data(
    world: &AuthoredWorld,
    live: &LiveWorld,
    character: &CharacterInstance,
    character_name: &str,
    layout: &LocationChoiceLayout,
) -> Result<LocationChoiceSheetData, DomainError> {
    let location_instance = live
        .location_instance(character.location_instance_id)
        .ok_or_else(|| {
            DomainError::not_found(
                "LocationInstance",
                character.location_instance_id.to_string(),
            )
        })?;
    let location = world
        .location(location_instance.location_id)
        .ok_or_else(|| DomainError::not_found("Location", location_instance.location_id.to_string()))?;

    let options = world
        .links_from(location.id)
        .into_iter()
        .filter(|link| is_link_admissible(world, live, character, link).is_ok())
        .take(layout.max_options)
        .enumerate()
        .map(|(index, link)| LocationOption {
            location_link_id: link.id,
            label: link.name.to_string(),
            destination: world
                .location(link.to_location_id)
                .map(|l| l.name.to_string())
                .unwrap_or_default(),
            mark_region: layout.option_region(index),
        })
        .collect();

    Ok(LocationChoiceSheetData {
        location_instance_id: location_instance.id,
        location_name: location.name.to_string(),
        location_description: location.description.to_string(),
        character_name: character_name.to_string(),
        health: character.health,
        options,
        code_region: layout.code_region,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Character, Game, Location, LocationLink};
    use crate::ids::{AccountId, GameInstanceId};
    use crate::value_objects::{CharacterName, GameName, LinkName, LocationName, Region};
    use crate::world::materialise;
    use chrono::Utc;

    fn layout(max_options: usize) -> LocationChoiceLayout {
        LocationChoiceLayout {
            code_region: Region::new(10.0, 10.0, 200.0, 20.0).unwrap(),
            first_option: Region::new(30.0, 100.0, 12.0, 12.0).unwrap(),
            option_spacing: 20.0,
            max_options,
        }
    }

    #[test]
    fn options_are_sorted_and_capped() {
        let now = Utc::now();
        let game = Game::new(GameName::new("Maze").unwrap(), now);
        let centre = Location::new(game.id, LocationName::new("Centre").unwrap(), now).starting();
        let mut world = AuthoredWorld::empty(game.clone());
        for name in ["West", "East", "North"] {
            let to = Location::new(game.id, LocationName::new(name).unwrap(), now);
            world
                .links
                .push(LocationLink::new(&centre, &to, LinkName::new(name).unwrap(), now).unwrap());
            world.locations.push(to);
        }
        world.locations.push(centre);

        let hero = Character::new(game.id, AccountId::new(), CharacterName::new("Hero").unwrap(), now);
        let live = materialise(&world, GameInstanceId::new(), &[hero], &mut || 0.0, now).unwrap();
        let data =
            location_choice_sheet_data(&world, &live, &live.characters[0], "Hero", &layout(2))
                .unwrap();

        let labels: Vec<&str> = data.options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["East", "North"]);
        assert_eq!(data.options[1].mark_region.y, 120.0);
        assert_eq!(data.location_name, "Centre");
        assert_eq!(data.health, 10);
    }
}
