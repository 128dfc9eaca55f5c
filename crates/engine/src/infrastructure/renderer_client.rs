//! PDF renderer client
//!
//! Implements the RendererPort trait. The renderer lays out the template,
//! the sheet payload and the printed code over the background image and
//! answers with `application/pdf` bytes.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::infrastructure::ports::{RenderError, RenderRequest, RendererPort};

#[derive(Clone)]
pub struct RendererClient {
    client: Client,
    base_url: String,
}

impl RendererClient {
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
}

#[derive(Serialize)]
struct RenderBody<'a> {
    sheet_type: &'a str,
    sheet_code: &'a str,
    layout: &'a serde_json::Value,
    sheet_data: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    background: Option<BackgroundBody>,
}

#[derive(Serialize)]
struct BackgroundBody {
    mime_type: &'static str,
    data: String,
}

impl<'a> From<&'a RenderRequest> for RenderBody<'a> {
    fn from(request: &'a RenderRequest) -> Self {
        Self {
            sheet_type: request.sheet_type.as_str(),
            sheet_code: &request.sheet_code,
            layout: &request.layout,
            sheet_data: &request.sheet_data,
            background: request.background.as_ref().map(|bg| BackgroundBody {
                mime_type: bg.mime_type.as_str(),
                data: general_purpose::STANDARD.encode(&bg.bytes),
            }),
        }
    }
}

#[async_trait]
impl RendererPort for RendererClient {
    async fn render(&self, request: RenderRequest) -> Result<Vec<u8>, RenderError> {
        let response = self
            .client
            .post(format!("{}/v1/render", self.base_url))
            .json(&RenderBody::from(&request))
            .send()
            .await
            .map_err(|e| RenderError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(if status.is_client_error() {
                RenderError::Failed(error_text)
            } else {
                RenderError::Unavailable(format!("{}: {}", status, error_text))
            });
        }

        let pdf = response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| RenderError::Unavailable(e.to_string()))?;
        if !pdf.starts_with(b"%PDF") {
            return Err(RenderError::Failed(
                "Renderer returned something other than a PDF".to_string(),
            ));
        }
        Ok(pdf)
    }
}
