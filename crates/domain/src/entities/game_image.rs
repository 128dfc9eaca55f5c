//! Game images - background artwork for printable sheets

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ids::{GameId, GameImageId};
use crate::value_objects::{MimeType, SheetType};

/// A stored background image. At most one per `(game_id, record_id, sheet_type)`.
#[derive(Debug, Clone, PartialEq)]
pub struct GameImage {
    pub id: GameImageId,
    pub game_id: GameId,
    /// `None` is the game-level fallback; otherwise a location or similar record.
    pub record_id: Option<Uuid>,
    pub sheet_type: SheetType,
    pub mime_type: MimeType,
    pub width: u32,
    pub height: u32,
    pub file_size: u32,
    pub bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GameImage {
    /// Whether this row and `other` occupy the same unique slot.
    pub fn same_slot(&self, other: &GameImage) -> bool {
        self.game_id == other.game_id
            && self.record_id == other.record_id
            && self.sheet_type == other.sheet_type
    }
}
