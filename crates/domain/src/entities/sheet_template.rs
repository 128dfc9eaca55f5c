//! Sheet templates - authored layouts for each printable sheet type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{GameId, GameInstanceId, SheetTemplateId};
use crate::value_objects::SheetType;

/// An authored template keyed by `(game, sheet_type, record_id)`.
///
/// `record_id` scopes the template to one record (usually a location);
/// `None` is the game-wide fallback. The layout is stored as JSON and parsed
/// into a typed layout per sheet type when used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetTemplate {
    pub id: SheetTemplateId,
    pub game_id: GameId,
    pub sheet_type: SheetType,
    pub record_id: Option<Uuid>,
    pub layout: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SheetTemplate {
    pub fn new(
        game_id: GameId,
        sheet_type: SheetType,
        record_id: Option<Uuid>,
        layout: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SheetTemplateId::new(),
            game_id,
            sheet_type,
            record_id,
            layout,
            created_at: now,
            updated_at: now,
        }
    }

    /// Freeze this template for an instance.
    pub fn snapshot(
        &self,
        game_instance_id: GameInstanceId,
        now: DateTime<Utc>,
    ) -> TemplateSnapshot {
        TemplateSnapshot {
            game_instance_id,
            template_id: self.id,
            sheet_type: self.sheet_type,
            record_id: self.record_id,
            layout: self.layout.clone(),
            captured_at: now,
        }
    }
}

/// A template frozen at instance start. Never modified after capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSnapshot {
    pub game_instance_id: GameInstanceId,
    pub template_id: SheetTemplateId,
    pub sheet_type: SheetType,
    pub record_id: Option<Uuid>,
    pub layout: serde_json::Value,
    pub captured_at: DateTime<Utc>,
}
