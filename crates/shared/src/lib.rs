//! Play-by-mail wire contracts
//!
//! Request and response bodies of the HTTP surface, plus the error body.
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - serde, uuid, chrono and the domain vocabulary enums
//! 2. **No business logic** - pure data types and serialization
//! 3. **No domain IDs** - raw `uuid::Uuid` in DTOs

pub mod errors;
pub mod requests;
pub mod responses;

pub use errors::{ErrorBody, ErrorCode};
pub use requests::{
    CreateGameRequest, CreatureData, ItemData, LinkData, LocationData, PlacementData,
    PutTemplateRequest, RequirementData, WorldDocument,
};
pub use responses::{
    GameResponse, HealthResponse, ImageUploadResponse, InstanceResponse, JoinAccepted,
    TemplateResponse, TurnSheetResponse, UploadSummary, WorldImportResponse,
};
