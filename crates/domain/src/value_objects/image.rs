//! Background image rules: accepted formats, size cap and dimension bounds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// Largest accepted image, in bytes (1 MiB, inclusive).
pub const MAX_IMAGE_BYTES: usize = 1024 * 1024;

/// Image formats a sheet background may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeType {
    Webp,
    Png,
    Jpeg,
}

impl MimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webp => "image/webp",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MimeType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image/webp" | "webp" => Ok(Self::Webp),
            "image/png" | "png" => Ok(Self::Png),
            "image/jpeg" | "image/jpg" | "jpeg" | "jpg" => Ok(Self::Jpeg),
            other => Err(DomainError::parse(format!("Unsupported image type: {}", other))),
        }
    }
}

/// Outcome of checking an image's dimensions against [`ImageBounds`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimensionFit {
    /// At or above the recommended size and within the hard maximum.
    Fits,
    /// Accepted, but smaller than recommended; carries the warning text.
    Suboptimal(String),
    /// Outside the hard bounds; carries the reason.
    OutOfBounds(String),
}

/// Authored pixel bounds for sheet backgrounds.
///
/// `min_*` and `max_*` are hard limits. Images between the minimum and the
/// recommended size are accepted with a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBounds {
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub recommended_width: u32,
    pub recommended_height: u32,
}

impl Default for ImageBounds {
    /// Letter-size page between 100 and 600 dpi, 300 dpi recommended.
    fn default() -> Self {
        Self {
            min_width: 850,
            min_height: 1100,
            max_width: 5100,
            max_height: 6600,
            recommended_width: 2550,
            recommended_height: 3300,
        }
    }
}

impl ImageBounds {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.min_width > self.recommended_width || self.recommended_width > self.max_width {
            return Err(DomainError::validation(
                "Image widths must satisfy min <= recommended <= max",
            ));
        }
        if self.min_height > self.recommended_height || self.recommended_height > self.max_height
        {
            return Err(DomainError::validation(
                "Image heights must satisfy min <= recommended <= max",
            ));
        }
        Ok(())
    }

    pub fn classify(&self, width: u32, height: u32) -> DimensionFit {
        if width < self.min_width || height < self.min_height {
            return DimensionFit::OutOfBounds(format!(
                "{}x{} is below the minimum of {}x{}",
                width, height, self.min_width, self.min_height
            ));
        }
        if width > self.max_width || height > self.max_height {
            return DimensionFit::OutOfBounds(format!(
                "{}x{} exceeds the maximum of {}x{}",
                width, height, self.max_width, self.max_height
            ));
        }
        if width < self.recommended_width || height < self.recommended_height {
            return DimensionFit::Suboptimal(format!(
                "{}x{} is below the recommended {}x{}; the printed sheet may look blurry",
                width, height, self.recommended_width, self.recommended_height
            ));
        }
        DimensionFit::Fits
    }
}
