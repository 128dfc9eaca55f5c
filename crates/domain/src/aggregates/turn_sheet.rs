//! TurnSheet aggregate - one player's sheet for one turn
//!
//! The processing state is an explicit tagged variant. Scan results exist only
//! inside the states that carry them, so a sheet can never hold a partial
//! result:
//!
//! ```text
//! pending --print--> printed --scan ok--> processed
//!    |                  |  \---scan failed--> failed --scan ok--> processed
//!    |                  |                       |  \--scan failed--> failed
//!    +-----------------+------------------------+--abandon--> abandoned
//! ```
//!
//! `processed` and `abandoned` are final.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;
use crate::ids::{AccountId, CharacterInstanceId, GameInstanceId, TurnSheetId};
use crate::value_objects::{ScanQuality, SheetCode, SheetToken, SheetType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Printed,
    Processed,
    Abandoned,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Printed => "printed",
            Self::Processed => "processed",
            Self::Abandoned => "abandoned",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "printed" => Ok(Self::Printed),
            "processed" => Ok(Self::Processed),
            "abandoned" => Ok(Self::Abandoned),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::parse(format!(
                "Invalid processing status: {}",
                other
            ))),
        }
    }
}

/// The result of one scan attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Structured answers, or error details for a failed scan.
    pub scanned_data: serde_json::Value,
    pub scanned_at: DateTime<Utc>,
    pub scan_quality: ScanQuality,
    /// Hex sha256 of the scanned image.
    pub image_digest: Option<String>,
}

impl ScanRecord {
    pub fn failure(reason: &str, scanned_at: DateTime<Utc>, image_digest: Option<String>) -> Self {
        Self {
            scanned_data: serde_json::json!({ "error": reason }),
            scanned_at,
            scan_quality: ScanQuality::ZERO,
            image_digest,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SheetState {
    Pending,
    Printed,
    Processed(ScanRecord),
    /// Keeps the last failed scan, if there was one.
    Abandoned(Option<ScanRecord>),
    Failed(ScanRecord),
}

impl SheetState {
    pub fn status(&self) -> ProcessingStatus {
        match self {
            Self::Pending => ProcessingStatus::Pending,
            Self::Printed => ProcessingStatus::Printed,
            Self::Processed(_) => ProcessingStatus::Processed,
            Self::Abandoned(_) => ProcessingStatus::Abandoned,
            Self::Failed(_) => ProcessingStatus::Failed,
        }
    }

    pub fn scan(&self) -> Option<&ScanRecord> {
        match self {
            Self::Processed(scan) | Self::Failed(scan) => Some(scan),
            Self::Abandoned(scan) => scan.as_ref(),
            Self::Pending | Self::Printed => None,
        }
    }
}

/// Flat persistence form of [`TurnSheet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnSheetRecord {
    pub id: TurnSheetId,
    pub code: SheetToken,
    pub game_instance_id: GameInstanceId,
    pub account_id: AccountId,
    pub character_instance_id: Option<CharacterInstanceId>,
    pub sheet_type: SheetType,
    pub turn_number: u32,
    pub sheet_data: serde_json::Value,
    pub processing_status: ProcessingStatus,
    pub scanned_data: Option<serde_json::Value>,
    pub scanned_at: Option<DateTime<Utc>>,
    pub scan_quality: Option<f64>,
    pub image_digest: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnSheet {
    id: TurnSheetId,
    /// Token printed in this sheet's code; unique across all sheets.
    code: SheetToken,
    game_instance_id: GameInstanceId,
    account_id: AccountId,
    character_instance_id: Option<CharacterInstanceId>,
    sheet_type: SheetType,
    turn_number: u32,
    sheet_data: serde_json::Value,
    state: SheetState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TurnSheet {
    // =========================================================================
    // Constructor
    // =========================================================================

    pub fn pending(
        game_instance_id: GameInstanceId,
        account_id: AccountId,
        character_instance_id: Option<CharacterInstanceId>,
        sheet_type: SheetType,
        turn_number: u32,
        sheet_data: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TurnSheetId::new(),
            code: SheetToken::generate(),
            game_instance_id,
            account_id,
            character_instance_id,
            sheet_type,
            turn_number,
            sheet_data,
            state: SheetState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> TurnSheetId {
        self.id
    }

    pub fn code(&self) -> SheetToken {
        self.code
    }

    pub fn game_instance_id(&self) -> GameInstanceId {
        self.game_instance_id
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn character_instance_id(&self) -> Option<CharacterInstanceId> {
        self.character_instance_id
    }

    pub fn sheet_type(&self) -> SheetType {
        self.sheet_type
    }

    pub fn turn_number(&self) -> u32 {
        self.turn_number
    }

    pub fn sheet_data(&self) -> &serde_json::Value {
        &self.sheet_data
    }

    pub fn state(&self) -> &SheetState {
        &self.state
    }

    pub fn status(&self) -> ProcessingStatus {
        self.state.status()
    }

    pub fn scan(&self) -> Option<&ScanRecord> {
        self.state.scan()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Processed and abandoned sheets never change again.
    pub fn is_final(&self) -> bool {
        matches!(
            self.state,
            SheetState::Processed(_) | SheetState::Abandoned(_)
        )
    }

    /// Whether an upload may be scanned against this sheet.
    pub fn accepts_scan(&self) -> bool {
        matches!(self.state, SheetState::Printed | SheetState::Failed(_))
    }

    /// The stored result when this exact image was already processed.
    pub fn prior_result_for(&self, image_digest: &str) -> Option<&ScanRecord> {
        match &self.state {
            SheetState::Processed(scan) if scan.image_digest.as_deref() == Some(image_digest) => {
                Some(scan)
            }
            _ => None,
        }
    }

    /// Key that fixes the order processed sheets are applied in.
    pub fn apply_order_key(&self) -> (AccountId, TurnSheetId) {
        (self.account_id, self.id)
    }

    /// The code printed on this sheet.
    pub fn sheet_code(&self) -> SheetCode {
        SheetCode::Live(self.code)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// `pending -> printed`
    pub fn mark_printed(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        match self.state {
            SheetState::Pending => {
                self.state = SheetState::Printed;
                self.updated_at = now;
                Ok(())
            }
            _ => Err(self.illegal(ProcessingStatus::Printed)),
        }
    }

    /// `printed | failed -> processed`
    pub fn record_scan(
        &mut self,
        scan: ScanRecord,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.accepts_scan() {
            return Err(self.illegal(ProcessingStatus::Processed));
        }
        self.state = SheetState::Processed(scan);
        self.updated_at = now;
        Ok(())
    }

    /// `printed | failed -> failed`
    pub fn record_failure(
        &mut self,
        scan: ScanRecord,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.accepts_scan() {
            return Err(self.illegal(ProcessingStatus::Failed));
        }
        self.state = SheetState::Failed(scan);
        self.updated_at = now;
        Ok(())
    }

    /// `pending | printed | failed -> abandoned`
    pub fn abandon(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        let last_scan = match &self.state {
            SheetState::Pending | SheetState::Printed => None,
            SheetState::Failed(scan) => Some(scan.clone()),
            SheetState::Processed(_) | SheetState::Abandoned(_) => {
                return Err(self.illegal(ProcessingStatus::Abandoned))
            }
        };
        self.state = SheetState::Abandoned(last_scan);
        self.updated_at = now;
        Ok(())
    }

    fn illegal(&self, to: ProcessingStatus) -> DomainError {
        DomainError::invalid_state_transition(format!(
            "turn sheet {}: {} -> {}",
            self.id,
            self.status(),
            to
        ))
    }
}

impl From<&TurnSheet> for TurnSheetRecord {
    fn from(sheet: &TurnSheet) -> Self {
        let scan = sheet.scan();
        Self {
            id: sheet.id,
            code: sheet.code,
            game_instance_id: sheet.game_instance_id,
            account_id: sheet.account_id,
            character_instance_id: sheet.character_instance_id,
            sheet_type: sheet.sheet_type,
            turn_number: sheet.turn_number,
            sheet_data: sheet.sheet_data.clone(),
            processing_status: sheet.status(),
            scanned_data: scan.map(|s| s.scanned_data.clone()),
            scanned_at: scan.map(|s| s.scanned_at),
            scan_quality: scan.map(|s| s.scan_quality.value()),
            image_digest: scan.and_then(|s| s.image_digest.clone()),
            created_at: sheet.created_at,
            updated_at: sheet.updated_at,
        }
    }
}

impl TryFrom<TurnSheetRecord> for TurnSheet {
    type Error = DomainError;

    /// Rebuild from storage. Scan columns must be all present or all absent,
    /// and present exactly when the status carries a result.
    fn try_from(record: TurnSheetRecord) -> Result<Self, Self::Error> {
        let scan = match (record.scanned_data, record.scanned_at, record.scan_quality) {
            (Some(scanned_data), Some(scanned_at), Some(quality)) => Some(ScanRecord {
                scanned_data,
                scanned_at,
                scan_quality: ScanQuality::new(quality)?,
                image_digest: record.image_digest,
            }),
            (None, None, None) => None,
            _ => {
                return Err(DomainError::constraint(format!(
                    "turn sheet {} has a partial scan result",
                    record.id
                )))
            }
        };

        let state = match (record.processing_status, scan) {
            (ProcessingStatus::Pending, None) => SheetState::Pending,
            (ProcessingStatus::Printed, None) => SheetState::Printed,
            (ProcessingStatus::Processed, Some(scan)) => SheetState::Processed(scan),
            (ProcessingStatus::Failed, Some(scan)) => SheetState::Failed(scan),
            (ProcessingStatus::Abandoned, scan) => SheetState::Abandoned(scan),
            (status, _) => {
                return Err(DomainError::constraint(format!(
                    "turn sheet {} is {} with inconsistent scan columns",
                    record.id, status
                )))
            }
        };

        Ok(Self {
            id: record.id,
            code: record.code,
            game_instance_id: record.game_instance_id,
            account_id: record.account_id,
            character_instance_id: record.character_instance_id,
            sheet_type: record.sheet_type,
            turn_number: record.turn_number,
            sheet_data: record.sheet_data,
            state,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}
