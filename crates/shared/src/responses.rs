//! Response bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use playbymail_domain::{InstanceStatus, ProcessingStatus, SheetType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub status: String,
    pub turn_duration_hours: u32,
    pub turn_limit: Option<u32>,
    pub designer_subscription_id: Option<Uuid>,
    pub manager_subscription_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceResponse {
    pub id: Uuid,
    pub game_id: Uuid,
    pub manager_subscription_id: Uuid,
    pub status: InstanceStatus,
    pub current_turn: u32,
    pub turn_limit: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_turn_at: Option<DateTime<Utc>>,
    pub turn_deadline_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnSheetResponse {
    pub id: Uuid,
    pub game_instance_id: Uuid,
    pub account_id: Uuid,
    pub character_instance_id: Option<Uuid>,
    pub sheet_type: SheetType,
    pub turn_number: u32,
    pub sheet_code: String,
    pub sheet_data: serde_json::Value,
    pub processing_status: ProcessingStatus,
    pub scanned_data: Option<serde_json::Value>,
    pub scanned_at: Option<DateTime<Utc>>,
    pub scan_quality: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of scanning a live turn sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub turn_sheet_id: Uuid,
    pub sheet_type: SheetType,
    pub processing_status: ProcessingStatus,
    pub scan_quality: Option<f64>,
    pub scanned_data: Option<serde_json::Value>,
}

/// Result of scanning a join sheet; enrolment happens asynchronously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinAccepted {
    pub join_submission_id: Uuid,
    pub game_id: Uuid,
    pub status: String,
    pub scan_quality: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUploadResponse {
    pub id: Uuid,
    pub game_id: Uuid,
    pub record_id: Option<Uuid>,
    pub sheet_type: SheetType,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub file_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateResponse {
    pub id: Uuid,
    pub game_id: Uuid,
    pub sheet_type: SheetType,
    pub record_id: Option<Uuid>,
    pub layout: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldImportResponse {
    pub game_id: Uuid,
    pub locations: usize,
    pub links: usize,
    pub requirements: usize,
    pub creatures: usize,
    pub items: usize,
    pub placements: usize,
}
