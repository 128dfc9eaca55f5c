//! Scripted vision service for testing.
//!
//! A fake scan is a PNG signature followed by a JSON script naming the code
//! printed on the page, the fill of every mark box and the handwritten
//! fields. [`ScriptedVision`] reads the script back instead of doing OCR.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use playbymail_domain::Region;

use crate::infrastructure::ports::{FieldReading, ScanError, VisionPort};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FakeScan {
    pub code: String,
    pub marks: Vec<f64>,
    pub fields: Vec<(String, f64)>,
    /// Vision answers 4xx for this page.
    pub unreadable: bool,
}

impl FakeScan {
    pub fn of(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    pub fn marking(mut self, marks: &[f64]) -> Self {
        self.marks = marks.to_vec();
        self
    }

    pub fn writing(mut self, name: &str, email: &str, postal_address: &str) -> Self {
        self.fields = vec![
            (name.to_string(), 0.9),
            (email.to_string(), 0.9),
            (postal_address.to_string(), 0.9),
        ];
        self
    }

    pub fn unreadable(mut self) -> Self {
        self.unreadable = true;
        self
    }

    pub fn to_image(&self) -> Vec<u8> {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend(serde_json::to_vec(self).expect("serialize fake scan"));
        bytes
    }

    fn from_image(image: &[u8]) -> Result<Self, ScanError> {
        image
            .strip_prefix(&PNG_SIGNATURE[..])
            .and_then(|script| serde_json::from_slice(script).ok())
            .ok_or_else(|| ScanError::Failed("not a scripted scan".to_string()))
    }
}

/// Vision service that reads [`FakeScan`] scripts, optionally slowly.
#[derive(Default)]
pub struct ScriptedVision {
    delay: Duration,
}

impl ScriptedVision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }

    async fn read(&self, image: &[u8]) -> Result<FakeScan, ScanError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        FakeScan::from_image(image)
    }
}

#[async_trait]
impl VisionPort for ScriptedVision {
    async fn read_code(&self, image: &[u8]) -> Result<String, ScanError> {
        // Code reading is never delayed so a slow page still gets its lock.
        Ok(FakeScan::from_image(image)?.code)
    }

    async fn detect_marks(&self, image: &[u8], regions: &[Region]) -> Result<Vec<f64>, ScanError> {
        let scan = self.read(image).await?;
        if scan.unreadable {
            return Err(ScanError::Failed("page is smudged".to_string()));
        }
        let mut marks = scan.marks;
        marks.resize(regions.len(), 0.0);
        Ok(marks)
    }

    async fn read_fields(
        &self,
        image: &[u8],
        _regions: &[Region],
    ) -> Result<Vec<FieldReading>, ScanError> {
        let scan = self.read(image).await?;
        if scan.unreadable {
            return Err(ScanError::Failed("page is smudged".to_string()));
        }
        Ok(scan
            .fields
            .into_iter()
            .map(|(text, confidence)| FieldReading { text, confidence })
            .collect())
    }
}
