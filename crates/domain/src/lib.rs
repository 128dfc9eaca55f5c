//! Play-by-mail domain: typed ids, authored entities, the turn sheet and game
//! instance state machines, the sheet code codec and the world rules.
//!
//! Pure and synchronous. Time and randomness are passed in by the caller.

pub mod aggregates;
pub mod entities;
pub mod error;
pub mod ids;
pub mod sheets;
pub mod value_objects;
pub mod world;

pub use aggregates::{
    GameInstance, GameInstanceRecord, InstanceAction, InstanceStatus, ProcessingStatus,
    ScanRecord, SheetState, TurnAdvance, TurnSheet, TurnSheetRecord,
};
pub use entities::{
    Character, CharacterInstance, Creature, CreatureInstance, CreaturePlacement, Disposition,
    Game, GameImage, GameStatus, Item, ItemInstance, ItemPlacement, ItemPosition,
    JoinSubmission, JoinSubmissionStatus, LinkRequirement, Location, LocationInstance,
    LocationLink, RequirementKind, SheetTemplate, Subscription, SubscriptionKind,
    TemplateSnapshot, CHARACTER_STARTING_HEALTH,
};
pub use error::DomainError;
pub use ids::{
    AccountId, CharacterId, CharacterInstanceId, CreatureId, CreatureInstanceId,
    CreaturePlacementId, GameId, GameImageId, GameInstanceId, ItemId, ItemInstanceId,
    ItemPlacementId, JobId, JoinSubmissionId, LinkRequirementId, LocationId, LocationInstanceId,
    LocationLinkId, SheetTemplateId, SubscriptionId, TurnSheetId,
};
pub use sheets::{
    JoinAnswers, JoinGameLayout, JoinGameSheetData, LocationChoiceAnswer, LocationChoiceLayout,
    LocationChoiceSheetData, LocationOption,
};
pub use value_objects::{
    CharacterName, CreatureName, Description, DimensionFit, GameName, ImageBounds, ItemName,
    LinkName, LocationName, MimeType, Region, ScanQuality, SheetCode, SheetCodeError,
    SheetToken, SheetType, SpawnChance, MAX_IMAGE_BYTES, SHEET_CODE_LEN,
};
pub use world::{check_readiness, materialise, AuthoredWorld, LiveWorld, ReadinessIssue, TurnEvent};
