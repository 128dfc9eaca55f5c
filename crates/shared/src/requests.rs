//! Request bodies
//!
//! Authoring payloads use caller-chosen ids so rows in one document can
//! reference each other.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateGameRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub turn_duration_hours: Option<u32>,
    #[serde(default)]
    pub turn_limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutTemplateRequest {
    #[serde(default)]
    pub record_id: Option<Uuid>,
    pub layout: serde_json::Value,
}

/// Whole-world replacement for a draft game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldDocument {
    #[serde(default)]
    pub locations: Vec<LocationData>,
    #[serde(default)]
    pub links: Vec<LinkData>,
    #[serde(default)]
    pub creatures: Vec<CreatureData>,
    #[serde(default)]
    pub items: Vec<ItemData>,
    #[serde(default)]
    pub creature_placements: Vec<PlacementData>,
    #[serde(default)]
    pub item_placements: Vec<PlacementData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationData {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_starting_location: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkData {
    pub id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<RequirementData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequirementData {
    Item { item_id: Uuid, quantity: u32 },
    CreatureAbsent { creature_id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatureData {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub disposition: String,
    pub max_health: u32,
    pub attack_damage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemData {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A creature or item placement; `template_id` names the creature or item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementData {
    pub template_id: Uuid,
    pub location_id: Uuid,
    pub quantity: u32,
    #[serde(default = "always")]
    pub spawn_chance: f64,
}

fn always() -> f64 {
    1.0
}
