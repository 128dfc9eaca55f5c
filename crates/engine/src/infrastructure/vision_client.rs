//! Vision service client
//!
//! Implements the VisionPort trait over the OCR/mark-detection service's JSON
//! API. Images travel base64-encoded.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use playbymail_domain::Region;

use crate::infrastructure::ports::{FieldReading, ScanError, VisionPort};

/// Client for the vision service API
#[derive(Clone)]
pub struct VisionClient {
    client: Client,
    base_url: String,
}

impl VisionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp, ScanError>
    where
        Req: Serialize + Sync,
        Resp: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(request)
            .send()
            .await
            .map_err(|e| ScanError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            // The service answers 4xx for images it cannot read.
            return Err(if status.is_client_error() {
                ScanError::Failed(error_text)
            } else {
                ScanError::Unavailable(format!("{}: {}", status, error_text))
            });
        }

        response
            .json()
            .await
            .map_err(|e| ScanError::Failed(format!("Invalid vision response: {}", e)))
    }
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    regions: Option<&'a [Region]>,
}

impl<'a> ImageRequest<'a> {
    fn new(image: &[u8], regions: Option<&'a [Region]>) -> Self {
        Self {
            image: general_purpose::STANDARD.encode(image),
            regions,
        }
    }
}

#[derive(Deserialize)]
struct CodeResponse {
    code: String,
}

#[derive(Deserialize)]
struct MarksResponse {
    fill_ratios: Vec<f64>,
}

#[derive(Deserialize)]
struct FieldsResponse {
    fields: Vec<FieldReading>,
}

#[async_trait]
impl VisionPort for VisionClient {
    async fn read_code(&self, image: &[u8]) -> Result<String, ScanError> {
        let response: CodeResponse = self
            .post("/v1/code", &ImageRequest::new(image, None))
            .await?;
        Ok(response.code)
    }

    async fn detect_marks(&self, image: &[u8], regions: &[Region]) -> Result<Vec<f64>, ScanError> {
        let response: MarksResponse = self
            .post("/v1/marks", &ImageRequest::new(image, Some(regions)))
            .await?;
        if response.fill_ratios.len() != regions.len() {
            return Err(ScanError::Failed(format!(
                "Expected {} fill ratios, got {}",
                regions.len(),
                response.fill_ratios.len()
            )));
        }
        Ok(response.fill_ratios)
    }

    async fn read_fields(
        &self,
        image: &[u8],
        regions: &[Region],
    ) -> Result<Vec<FieldReading>, ScanError> {
        let response: FieldsResponse = self
            .post("/v1/fields", &ImageRequest::new(image, Some(regions)))
            .await?;
        if response.fields.len() != regions.len() {
            return Err(ScanError::Failed(format!(
                "Expected {} field readings, got {}",
                regions.len(),
                response.fields.len()
            )));
        }
        Ok(response.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_request_encodes_bytes_and_omits_missing_regions() {
        let request = ImageRequest::new(&[0xff, 0xd8, 0xff], None);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["image"], "/9j/");
        assert!(json.get("regions").is_none());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = VisionClient::new("http://vision:8090/", Duration::from_secs(5));
        assert_eq!(client.base_url, "http://vision:8090");
    }
}
