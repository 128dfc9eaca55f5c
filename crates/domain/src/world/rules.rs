//! Turn rules: moving characters and resolving the end of a turn
//!
//! Encounters are table driven. Each creature disposition maps to an
//! [`EncounterRule`] that says who strikes whom.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{CharacterInstance, Disposition, ItemPosition, LocationLink, RequirementKind};
use crate::ids::{
    CharacterInstanceId, CreatureInstanceId, ItemInstanceId, LocationInstanceId, LocationLinkId,
};
use crate::sheets::LocationChoiceAnswer;
use crate::world::{AuthoredWorld, LiveWorld};

/// Damage a character deals when striking back.
pub const CHARACTER_STRIKE_DAMAGE: u32 = 1;

/// What happens when a character shares a location with a creature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncounterRule {
    /// The creature hits the character for its attack damage.
    pub creature_strikes: bool,
    /// A character still standing hits back for [`CHARACTER_STRIKE_DAMAGE`].
    pub character_strikes_back: bool,
}

const ENCOUNTER_RULES: [(Disposition, EncounterRule); 3] = [
    (
        Disposition::Aggressive,
        EncounterRule {
            creature_strikes: true,
            character_strikes_back: true,
        },
    ),
    (
        Disposition::Inquisitive,
        EncounterRule {
            creature_strikes: false,
            character_strikes_back: false,
        },
    ),
    (
        Disposition::Indifferent,
        EncounterRule {
            creature_strikes: false,
            character_strikes_back: false,
        },
    ),
];

pub fn encounter_rule(disposition: Disposition) -> EncounterRule {
    ENCOUNTER_RULES
        .iter()
        .find(|(d, _)| *d == disposition)
        .map(|(_, rule)| *rule)
        .unwrap_or(EncounterRule {
            creature_strikes: false,
            character_strikes_back: false,
        })
}

/// Something that happened while a turn was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TurnEvent {
    Moved {
        character: CharacterInstanceId,
        from: LocationInstanceId,
        to: LocationInstanceId,
    },
    MoveRefused {
        character: CharacterInstanceId,
        link: LocationLinkId,
        reason: String,
    },
    Struck {
        creature: CreatureInstanceId,
        character: CharacterInstanceId,
        damage: u32,
    },
    StruckBack {
        character: CharacterInstanceId,
        creature: CreatureInstanceId,
        damage: u32,
    },
    CharacterDefeated {
        character: CharacterInstanceId,
    },
    CreatureDefeated {
        creature: CreatureInstanceId,
    },
    PickedUp {
        character: CharacterInstanceId,
        item: ItemInstanceId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved(TurnEvent),
    Stayed,
    Refused(TurnEvent),
}

impl MoveOutcome {
    pub fn event(&self) -> Option<&TurnEvent> {
        match self {
            Self::Moved(event) | Self::Refused(event) => Some(event),
            Self::Stayed => None,
        }
    }
}

/// Whether `character` may traverse `link` right now.
///
/// Returns the reason when it may not.
pub fn is_link_admissible(
    world: &AuthoredWorld,
    live: &LiveWorld,
    character: &CharacterInstance,
    link: &LocationLink,
) -> Result<(), String> {
    let origin = live
        .location_instance_of(link.from_location_id)
        .ok_or_else(|| "the link's origin is not part of this instance".to_string())?;
    if origin.id != character.location_instance_id {
        return Err("the character is not at the link's origin".to_string());
    }
    if !character.is_active() {
        return Err("the character is out of the game".to_string());
    }

    for requirement in world.requirements_for(link.id) {
        match requirement.kind {
            RequirementKind::Item { item_id, quantity } => {
                if live.held_count(character.id, item_id) < quantity {
                    return Err(format!("requires {} of item {}", quantity, item_id));
                }
            }
            RequirementKind::CreatureAbsent { creature_id } => {
                if live
                    .living_creatures_at(origin.id)
                    .any(|c| c.creature_id == creature_id)
                {
                    return Err(format!("creature {} blocks the way", creature_id));
                }
            }
        }
    }
    Ok(())
}

/// Apply one scanned location choice.
///
/// A link that is unknown or no longer admissible leaves the character in
/// place and is reported as a refused move.
pub fn apply_location_choice(
    world: &AuthoredWorld,
    live: &mut LiveWorld,
    character_id: CharacterInstanceId,
    answer: &LocationChoiceAnswer,
    now: DateTime<Utc>,
) -> MoveOutcome {
    let Some(link_id) = answer.location_link_id else {
        return MoveOutcome::Stayed;
    };
    let refused = |reason: String| {
        MoveOutcome::Refused(TurnEvent::MoveRefused {
            character: character_id,
            link: link_id,
            reason,
        })
    };

    let Some(link) = world.link(link_id) else {
        return refused("the link is not part of this game".to_string());
    };
    let Some(character) = live.character(character_id) else {
        return refused("the character is not part of this instance".to_string());
    };
    if let Err(reason) = is_link_admissible(world, live, character, link) {
        return refused(reason);
    }
    let Some(destination) = live.location_instance_of(link.to_location_id).map(|l| l.id) else {
        return refused("the destination is not part of this instance".to_string());
    };

    let Some(character) = live.character_mut(character_id) else {
        return refused("the character is not part of this instance".to_string());
    };
    let from = character.location_instance_id;
    character.location_instance_id = destination;
    character.updated_at = now;
    MoveOutcome::Moved(TurnEvent::Moved {
        character: character_id,
        from,
        to: destination,
    })
}

/// Resolve encounters, then item pickups, for the given character order.
pub fn resolve_end_of_turn(
    world: &AuthoredWorld,
    live: &mut LiveWorld,
    order: &[CharacterInstanceId],
    now: DateTime<Utc>,
) -> Vec<TurnEvent> {
    let mut events = Vec::new();

    for &character_id in order {
        let Some(location) = live
            .character(character_id)
            .filter(|c| c.is_active())
            .map(|c| c.location_instance_id)
        else {
            continue;
        };

        let mut creature_ids: Vec<CreatureInstanceId> =
            live.living_creatures_at(location).map(|c| c.id).collect();
        creature_ids.sort();

        for creature_id in creature_ids {
            let Some(creature) = live.creatures.iter().find(|c| c.id == creature_id) else {
                continue;
            };
            if !creature.is_alive() {
                continue;
            }
            let Some(template) = world.creature(creature.creature_id) else {
                continue;
            };
            let rule = encounter_rule(template.disposition);
            let attack = template.attack_damage;

            if rule.creature_strikes {
                let Some(character) = live.character_mut(character_id) else {
                    break;
                };
                character.take_damage(attack, now);
                let fallen = !character.is_active();
                events.push(TurnEvent::Struck {
                    creature: creature_id,
                    character: character_id,
                    damage: attack,
                });
                if fallen {
                    events.push(TurnEvent::CharacterDefeated {
                        character: character_id,
                    });
                    break;
                }
            }

            if rule.character_strikes_back {
                if let Some(creature) = live.creatures.iter_mut().find(|c| c.id == creature_id) {
                    creature.take_damage(CHARACTER_STRIKE_DAMAGE, now);
                    events.push(TurnEvent::StruckBack {
                        character: character_id,
                        creature: creature_id,
                        damage: CHARACTER_STRIKE_DAMAGE,
                    });
                    if !creature.is_alive() {
                        events.push(TurnEvent::CreatureDefeated {
                            creature: creature_id,
                        });
                    }
                }
            }
        }
    }

    for &character_id in order {
        let Some(location) = live
            .character(character_id)
            .filter(|c| c.is_active())
            .map(|c| c.location_instance_id)
        else {
            continue;
        };
        let mut items: Vec<&mut crate::entities::ItemInstance> = live
            .items
            .iter_mut()
            .filter(|i| i.is_unowned_at(location))
            .collect();
        items.sort_by_key(|i| i.id);
        for item in items {
            item.position = ItemPosition::HeldBy(character_id);
            item.updated_at = now;
            events.push(TurnEvent::PickedUp {
                character: character_id,
                item: item.id,
            });
        }
    }

    events
}
