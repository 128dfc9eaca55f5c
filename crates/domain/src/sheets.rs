//! Sheet layouts, payloads and scanned answers
//!
//! A template's JSON layout is parsed into a typed layout for its sheet type.
//! The layout plus the live world produce the `sheet_data` stored on each
//! turn sheet; scanners read that payload back to know where to look.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{LocationInstanceId, LocationLinkId};
use crate::value_objects::Region;

fn from_json<T: DeserializeOwned>(
    value: &serde_json::Value,
    what: &str,
) -> Result<T, DomainError> {
    serde_json::from_value(value.clone())
        .map_err(|e| DomainError::parse(format!("Invalid {}: {}", what, e)))
}

fn to_json<T: Serialize>(payload: &T) -> serde_json::Value {
    // Plain structs of strings, ids and numbers always serialize
    serde_json::to_value(payload).unwrap_or(serde_json::Value::Null)
}

// ============================================================================
// Layouts
// ============================================================================

/// Layout of a location choice sheet.
///
/// Option `n` is marked inside `first_option` shifted down by
/// `n * option_spacing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationChoiceLayout {
    pub code_region: Region,
    pub first_option: Region,
    pub option_spacing: f64,
    pub max_options: usize,
}

impl LocationChoiceLayout {
    pub fn from_json(value: &serde_json::Value) -> Result<Self, DomainError> {
        let layout: Self = from_json(value, "location choice layout")?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn to_json(&self) -> serde_json::Value {
        to_json(self)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        self.code_region.validate()?;
        self.first_option.validate()?;
        if !self.option_spacing.is_finite() || self.option_spacing < self.first_option.height {
            return Err(DomainError::validation(
                "Option spacing must be at least the option box height",
            ));
        }
        if self.max_options == 0 {
            return Err(DomainError::validation("A layout must allow at least one option"));
        }
        Ok(())
    }

    pub fn option_region(&self, index: usize) -> Region {
        self.first_option
            .shifted_down(self.option_spacing * index as f64)
    }
}

/// Layout of a blank join sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinGameLayout {
    pub code_region: Region,
    pub name: Region,
    pub email: Region,
    pub postal_address: Region,
}

impl JoinGameLayout {
    pub fn from_json(value: &serde_json::Value) -> Result<Self, DomainError> {
        let layout: Self = from_json(value, "join game layout")?;
        for region in [
            &layout.code_region,
            &layout.name,
            &layout.email,
            &layout.postal_address,
        ] {
            region.validate()?;
        }
        Ok(layout)
    }

    pub fn to_json(&self) -> serde_json::Value {
        to_json(self)
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationOption {
    pub location_link_id: LocationLinkId,
    pub label: String,
    pub destination: String,
    pub mark_region: Region,
}

/// `sheet_data` of a location choice sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationChoiceSheetData {
    pub location_instance_id: LocationInstanceId,
    pub location_name: String,
    pub location_description: String,
    pub character_name: String,
    pub health: u32,
    pub options: Vec<LocationOption>,
    pub code_region: Region,
}

impl LocationChoiceSheetData {
    pub fn from_json(value: &serde_json::Value) -> Result<Self, DomainError> {
        from_json(value, "location choice sheet data")
    }

    pub fn to_json(&self) -> serde_json::Value {
        to_json(self)
    }

    pub fn option(&self, link_id: LocationLinkId) -> Option<&LocationOption> {
        self.options.iter().find(|o| o.location_link_id == link_id)
    }
}

/// `sheet_data` of a blank join sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinGameSheetData {
    pub game_name: String,
    pub code_region: Region,
    pub name_region: Region,
    pub email_region: Region,
    pub postal_address_region: Region,
}

impl JoinGameSheetData {
    pub fn from_layout(game_name: impl Into<String>, layout: &JoinGameLayout) -> Self {
        Self {
            game_name: game_name.into(),
            code_region: layout.code_region,
            name_region: layout.name,
            email_region: layout.email,
            postal_address_region: layout.postal_address,
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, DomainError> {
        from_json(value, "join game sheet data")
    }

    pub fn to_json(&self) -> serde_json::Value {
        to_json(self)
    }
}

// ============================================================================
// Answers
// ============================================================================

/// Scanned answer of a location choice sheet. `None` means stay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationChoiceAnswer {
    pub location_link_id: Option<LocationLinkId>,
}

impl LocationChoiceAnswer {
    pub fn from_json(value: &serde_json::Value) -> Result<Self, DomainError> {
        from_json(value, "location choice answer")
    }

    pub fn to_json(&self) -> serde_json::Value {
        to_json(self)
    }
}

/// Scanned answers of a join sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAnswers {
    pub name: String,
    pub email: String,
    pub postal_address: String,
}

impl JoinAnswers {
    /// Trim every field and check it is usable.
    pub fn normalized(self) -> Result<Self, DomainError> {
        let answers = Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_ascii_lowercase(),
            postal_address: self.postal_address.trim().to_string(),
        };
        if answers.name.is_empty() {
            return Err(DomainError::validation("Name is blank"));
        }
        if answers.postal_address.is_empty() {
            return Err(DomainError::validation("Postal address is blank"));
        }
        if !is_plausible_email(&answers.email) {
            return Err(DomainError::validation(format!(
                "'{}' is not an e-mail address",
                answers.email
            )));
        }
        Ok(answers)
    }

    pub fn to_json(&self) -> serde_json::Value {
        to_json(self)
    }
}

fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
