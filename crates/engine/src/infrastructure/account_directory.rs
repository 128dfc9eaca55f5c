//! Account directory client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use playbymail_domain::{AccountId, JoinAnswers};

use crate::infrastructure::ports::{AccountDirectoryPort, DirectoryError};

#[derive(Clone)]
pub struct AccountDirectoryClient {
    client: Client,
    base_url: String,
}

impl AccountDirectoryClient {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ResolveResponse {
    account_id: Uuid,
}

#[async_trait]
impl AccountDirectoryPort for AccountDirectoryClient {
    async fn resolve_account(&self, answers: &JoinAnswers) -> Result<AccountId, DirectoryError> {
        let response = self
            .client
            .post(format!("{}/v1/accounts/resolve", self.base_url))
            .json(answers)
            .send()
            .await
            .map_err(|e| DirectoryError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DirectoryError::RequestFailed(error_text));
        }

        let body: ResolveResponse = response
            .json()
            .await
            .map_err(|e| DirectoryError::RequestFailed(e.to_string()))?;
        Ok(AccountId::from(body.account_id))
    }
}
