//! Readiness validation run before an instance starts

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use crate::entities::RequirementKind;
use crate::ids::{LocationId, LocationLinkId};
use crate::world::AuthoredWorld;

/// A reason an instance cannot start yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ReadinessIssue {
    NoLocations,
    NoStartingLocation,
    UnsatisfiableRequirement {
        link_id: LocationLinkId,
        reason: String,
    },
    NoPlayersJoined,
}

impl std::fmt::Display for ReadinessIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoLocations => write!(f, "the game has no locations"),
            Self::NoStartingLocation => write!(f, "no location is marked as a starting location"),
            Self::UnsatisfiableRequirement { link_id, reason } => {
                write!(f, "link {} can never be used: {}", link_id, reason)
            }
            Self::NoPlayersJoined => write!(f, "no player has joined the instance"),
        }
    }
}

/// Collect every issue blocking a start. An empty list means ready.
///
/// `joined_players` counts player subscriptions bound to the instance.
pub fn check_readiness(world: &AuthoredWorld, joined_players: usize) -> Vec<ReadinessIssue> {
    let mut issues = Vec::new();

    if world.locations.is_empty() {
        issues.push(ReadinessIssue::NoLocations);
    } else if world.starting_locations().is_empty() {
        issues.push(ReadinessIssue::NoStartingLocation);
    }

    for link_id in reachable_links(world) {
        for requirement in world.requirements_for(link_id) {
            if let Some(reason) = unsatisfiable_reason(world, requirement.kind) {
                issues.push(ReadinessIssue::UnsatisfiableRequirement { link_id, reason });
            }
        }
    }

    if joined_players == 0 {
        issues.push(ReadinessIssue::NoPlayersJoined);
    }

    issues
}

/// Links whose origin is reachable from a starting location, in visit order.
fn reachable_links(world: &AuthoredWorld) -> Vec<LocationLinkId> {
    let mut seen: HashSet<LocationId> = HashSet::new();
    let mut queue: VecDeque<LocationId> = VecDeque::new();
    for start in world.starting_locations() {
        if seen.insert(start.id) {
            queue.push_back(start.id);
        }
    }

    let mut links = Vec::new();
    while let Some(location_id) = queue.pop_front() {
        for link in world.links_from(location_id) {
            links.push(link.id);
            if seen.insert(link.to_location_id) {
                queue.push_back(link.to_location_id);
            }
        }
    }
    links
}

fn unsatisfiable_reason(world: &AuthoredWorld, kind: RequirementKind) -> Option<String> {
    match kind {
        RequirementKind::Item { item_id, quantity } => {
            let Some(item) = world.item(item_id) else {
                return Some(format!("item {} is not part of the game", item_id));
            };
            let available: u64 = world
                .item_placements
                .iter()
                .filter(|p| p.item_id == item_id && p.spawn_chance.is_possible())
                .map(|p| u64::from(p.quantity))
                .sum();
            if available < u64::from(quantity) {
                return Some(format!(
                    "needs {} x {} but at most {} can spawn",
                    quantity, item.name, available
                ));
            }
            None
        }
        RequirementKind::CreatureAbsent { creature_id } => match world.creature(creature_id) {
            None => Some(format!("creature {} is not part of the game", creature_id)),
            Some(creature) if !creature.is_defeatable() => {
                Some(format!("{} cannot be defeated", creature.name))
            }
            Some(_) => None,
        },
    }
}
