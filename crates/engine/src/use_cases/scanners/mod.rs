//! Sheet scanners.
//!
//! One scanner per scannable [`SheetType`], held in a registry built at
//! startup. The set is closed: a new sheet type means a new
//! [`SheetScanner`] variant and a new registration in
//! [`ScannerRegistry::standard`].

mod join_game;
mod location_choice;

pub use join_game::JoinGameScanner;
pub use location_choice::LocationChoiceScanner;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use playbymail_domain::{ScanQuality, SheetType};

use crate::infrastructure::ports::{ScanError, VisionPort};
use crate::use_cases::context::RequestContext;
use crate::use_cases::error::interrupted_scan;

/// Structured answers read from a sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Scanned {
    pub answers: serde_json::Value,
    pub quality: ScanQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("No scanner is registered for {0} sheets")]
pub struct UnsupportedSheetType(pub SheetType);

pub enum SheetScanner {
    LocationChoice(LocationChoiceScanner),
    JoinGame(JoinGameScanner),
}

impl SheetScanner {
    pub fn sheet_type(&self) -> SheetType {
        match self {
            Self::LocationChoice(_) => SheetType::LocationChoice,
            Self::JoinGame(_) => SheetType::JoinGame,
        }
    }

    /// Read the answers off `image`, guided by the sheet's payload.
    pub async fn scan(
        &self,
        ctx: &RequestContext,
        image: &[u8],
        sheet_data: &serde_json::Value,
    ) -> Result<Scanned, ScanError> {
        match self {
            Self::LocationChoice(scanner) => scanner.scan(ctx, image, sheet_data).await,
            Self::JoinGame(scanner) => scanner.scan(ctx, image, sheet_data).await,
        }
    }
}

pub struct ScannerRegistry {
    scanners: BTreeMap<SheetType, SheetScanner>,
    vision: Arc<dyn VisionPort>,
    timeout: Duration,
}

impl ScannerRegistry {
    pub fn new(vision: Arc<dyn VisionPort>, timeout: Duration) -> Self {
        Self {
            scanners: BTreeMap::new(),
            vision,
            timeout,
        }
    }

    /// Registry with every scanner the service supports.
    pub fn standard(vision: Arc<dyn VisionPort>, timeout: Duration) -> Self {
        let mut registry = Self::new(vision.clone(), timeout);
        registry.register(SheetScanner::LocationChoice(LocationChoiceScanner::new(
            vision.clone(),
            timeout,
        )));
        registry.register(SheetScanner::JoinGame(JoinGameScanner::new(vision, timeout)));
        registry
    }

    /// Register a scanner, replacing any scanner for the same type.
    pub fn register(&mut self, scanner: SheetScanner) {
        let sheet_type = scanner.sheet_type();
        tracing::debug!(sheet_type = %sheet_type, "Registered sheet scanner");
        self.scanners.insert(sheet_type, scanner);
    }

    pub fn get(&self, sheet_type: SheetType) -> Result<&SheetScanner, UnsupportedSheetType> {
        self.scanners
            .get(&sheet_type)
            .ok_or(UnsupportedSheetType(sheet_type))
    }

    pub fn supported(&self) -> Vec<SheetType> {
        self.scanners.keys().copied().collect()
    }

    /// Read the printed code before the authoritative scanner is known.
    pub async fn extract_code(
        &self,
        ctx: &RequestContext,
        image: &[u8],
    ) -> Result<String, ScanError> {
        let code = ctx
            .bounded(self.timeout, self.vision.read_code(image))
            .await
            .map_err(interrupted_scan)??;
        let code = code.trim().to_string();
        if code.is_empty() {
            return Err(ScanError::Failed("no sheet code found".to_string()));
        }
        Ok(code)
    }
}
