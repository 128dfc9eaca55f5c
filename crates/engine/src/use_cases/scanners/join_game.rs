//! Join game scanner: the handwritten name, e-mail and postal address.

use std::sync::Arc;
use std::time::Duration;

use playbymail_domain::{JoinAnswers, JoinGameSheetData, ScanQuality};

use crate::infrastructure::ports::{ScanError, VisionPort};
use crate::use_cases::context::RequestContext;
use crate::use_cases::error::interrupted_scan;

use super::Scanned;

pub struct JoinGameScanner {
    vision: Arc<dyn VisionPort>,
    timeout: Duration,
}

impl JoinGameScanner {
    pub fn new(vision: Arc<dyn VisionPort>, timeout: Duration) -> Self {
        Self { vision, timeout }
    }

    pub async fn scan(
        &self,
        ctx: &RequestContext,
        image: &[u8],
        sheet_data: &serde_json::Value,
    ) -> Result<Scanned, ScanError> {
        let data = JoinGameSheetData::from_json(sheet_data)
            .map_err(|e| ScanError::Failed(e.to_string()))?;
        let regions = [data.name_region, data.email_region, data.postal_address_region];

        let readings = ctx
            .bounded(self.timeout, self.vision.read_fields(image, &regions))
            .await
            .map_err(interrupted_scan)??;
        let [name, email, postal_address] = <[_; 3]>::try_from(readings).map_err(|r: Vec<_>| {
            ScanError::Failed(format!("expected 3 field readings, got {}", r.len()))
        })?;

        let quality = [&name, &email, &postal_address]
            .iter()
            .map(|field| field.confidence)
            .fold(1.0_f64, f64::min);
        let answers = JoinAnswers {
            name: name.text,
            email: email.text,
            postal_address: postal_address.text,
        }
        .normalized()
        .map_err(|e| ScanError::Failed(e.to_string()))?;

        Ok(Scanned {
            answers: answers.to_json(),
            quality: ScanQuality::clamped(quality),
        })
    }
}
