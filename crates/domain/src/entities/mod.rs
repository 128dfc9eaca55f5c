//! Entities - authored game content and live world rows
//!
//! These are plain data structs: fields are public where no invariant needs
//! guarding. State machines live in `aggregates`.

mod character;
mod creature;
mod game;
mod game_image;
mod item;
mod join_submission;
mod live;
mod location;
mod placement;
mod sheet_template;
mod subscription;

pub use character::Character;
pub use creature::{Creature, Disposition};
pub use game::{Game, GameStatus};
pub use game_image::GameImage;
pub use item::Item;
pub use join_submission::{JoinSubmission, JoinSubmissionStatus};
pub use live::{
    CharacterInstance, CreatureInstance, ItemInstance, ItemPosition, LocationInstance,
    CHARACTER_STARTING_HEALTH,
};
pub use location::{LinkRequirement, Location, LocationLink, RequirementKind};
pub use placement::{CreaturePlacement, ItemPlacement};
pub use sheet_template::{SheetTemplate, TemplateSnapshot};
pub use subscription::{Subscription, SubscriptionKind};
