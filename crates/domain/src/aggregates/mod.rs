//! Aggregate roots - domain objects that guard their own state machines
//!
//! Fields are private; every mutation goes through a transition method that
//! returns `DomainError::InvalidStateTransition` when the move is illegal.
//! Each aggregate has a flat `*Record` form for persistence, converted back
//! with `TryFrom` so stored rows are re-validated on load.

pub mod game_instance;
pub mod turn_sheet;

pub use game_instance::{
    GameInstance, GameInstanceRecord, InstanceAction, InstanceStatus, TurnAdvance,
};
pub use turn_sheet::{ProcessingStatus, ScanRecord, SheetState, TurnSheet, TurnSheetRecord};
