//! Rectangular regions on a printed page.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A rectangle in page units (points, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Result<Self, DomainError> {
        let region = Self {
            x,
            y,
            width,
            height,
        };
        region.validate()?;
        Ok(region)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.x < 0.0 || self.y < 0.0 {
            return Err(DomainError::validation(
                "Region coordinates must be finite and non-negative",
            ));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(DomainError::validation("Region must have a positive size"));
        }
        Ok(())
    }

    /// The same box shifted down the page.
    pub fn shifted_down(&self, dy: f64) -> Self {
        Self {
            y: self.y + dy,
            ..*self
        }
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_regions_are_rejected() {
        assert!(Region::new(0.0, 0.0, 0.0, 10.0).is_err());
        assert!(Region::new(-1.0, 0.0, 10.0, 10.0).is_err());
        assert!(Region::new(0.0, f64::INFINITY, 10.0, 10.0).is_err());
    }

    #[test]
    fn shifting_keeps_the_size() {
        let r = Region::new(10.0, 20.0, 30.0, 12.0).unwrap();
        let s = r.shifted_down(18.0);
        assert_eq!(s.y, 38.0);
        assert_eq!(s.width, 30.0);
        assert_eq!(s.bottom(), 50.0);
    }
}
