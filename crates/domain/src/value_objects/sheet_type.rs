//! The closed set of printable sheet types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// Every kind of sheet the service can print and scan.
///
/// Adding a variant is a deliberate act: the scanner registry, the template
/// registry and the turn advancement engine all match on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetType {
    /// Player marks one outbound link at their current location.
    LocationChoice,
    /// Blank "come play" sheet carrying a join code.
    JoinGame,
    /// Inventory sheet; only its template storage is supported.
    InventoryManagement,
}

impl SheetType {
    pub const ALL: [SheetType; 3] = [
        SheetType::LocationChoice,
        SheetType::JoinGame,
        SheetType::InventoryManagement,
    ];

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocationChoice => "location_choice",
            Self::JoinGame => "join_game",
            Self::InventoryManagement => "inventory_management",
        }
    }

    /// Whether sheets of this type are generated per player per turn.
    pub fn is_turn_sheet(&self) -> bool {
        matches!(self, Self::LocationChoice | Self::InventoryManagement)
    }
}

impl fmt::Display for SheetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SheetType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "location_choice" => Ok(Self::LocationChoice),
            "join_game" => Ok(Self::JoinGame),
            "inventory_management" => Ok(Self::InventoryManagement),
            other => Err(DomainError::parse(format!("Unknown sheet type: {}", other))),
        }
    }
}
