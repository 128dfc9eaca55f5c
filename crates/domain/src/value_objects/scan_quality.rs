//! Scan quality score.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Confidence of a scan, always within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ScanQuality(f64);

impl ScanQuality {
    /// Quality recorded against a failed scan.
    pub const ZERO: ScanQuality = ScanQuality(0.0);

    pub fn new(value: f64) -> Result<Self, DomainError> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(DomainError::validation(format!(
                "Scan quality must be within [0, 1], got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    /// Clamp an arbitrary score into range. NaN becomes zero.
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for ScanQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

impl TryFrom<f64> for ScanQuality {
    type Error = DomainError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ScanQuality> for f64 {
    fn from(quality: ScanQuality) -> f64 {
        quality.0
    }
}
