//! Location choice scanner: which option box did the player mark?

use std::sync::Arc;
use std::time::Duration;

use playbymail_domain::{LocationChoiceAnswer, LocationChoiceSheetData, Region, ScanQuality};

use crate::infrastructure::ports::{ScanError, VisionPort};
use crate::use_cases::context::RequestContext;
use crate::use_cases::error::interrupted_scan;

use super::Scanned;

/// Fill ratio at or above which a box counts as marked.
pub const MARK_THRESHOLD: f64 = 0.5;

pub struct LocationChoiceScanner {
    vision: Arc<dyn VisionPort>,
    timeout: Duration,
}

impl LocationChoiceScanner {
    pub fn new(vision: Arc<dyn VisionPort>, timeout: Duration) -> Self {
        Self { vision, timeout }
    }

    pub async fn scan(
        &self,
        ctx: &RequestContext,
        image: &[u8],
        sheet_data: &serde_json::Value,
    ) -> Result<Scanned, ScanError> {
        let data = LocationChoiceSheetData::from_json(sheet_data)
            .map_err(|e| ScanError::Failed(e.to_string()))?;
        if data.options.is_empty() {
            return Ok(Scanned {
                answers: LocationChoiceAnswer {
                    location_link_id: None,
                }
                .to_json(),
                quality: ScanQuality::clamped(1.0),
            });
        }

        let regions: Vec<Region> = data.options.iter().map(|o| o.mark_region).collect();
        let fills = ctx
            .bounded(self.timeout, self.vision.detect_marks(image, &regions))
            .await
            .map_err(interrupted_scan)??;
        if fills.len() != regions.len() {
            return Err(ScanError::Failed(format!(
                "expected {} mark readings, got {}",
                regions.len(),
                fills.len()
            )));
        }
        if let Some(index) = fills.iter().position(|fill| !fill.is_finite()) {
            return Err(ScanError::Failed(format!(
                "unreadable fill for option {}",
                index
            )));
        }

        let marked: Vec<usize> = fills
            .iter()
            .enumerate()
            .filter(|(_, fill)| **fill >= MARK_THRESHOLD)
            .map(|(index, _)| index)
            .collect();
        if marked.len() > 1 {
            return Err(ScanError::Failed(format!(
                "ambiguous: {} options marked",
                marked.len()
            )));
        }

        let answer = LocationChoiceAnswer {
            location_link_id: marked.first().map(|&index| data.options[index].location_link_id),
        };
        Ok(Scanned {
            answers: answer.to_json(),
            quality: mark_quality(&fills),
        })
    }
}

/// How clearly every box reads as marked or blank.
///
/// The box closest to the threshold decides: a fill of exactly 0.5 scores 0,
/// a fully blank or fully filled box scores 1.
fn mark_quality(fills: &[f64]) -> ScanQuality {
    let closest = fills
        .iter()
        .map(|fill| (fill.clamp(0.0, 1.0) - MARK_THRESHOLD).abs() * 2.0)
        .fold(1.0_f64, f64::min);
    ScanQuality::clamped(closest)
}
