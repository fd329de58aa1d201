//! Token directory lookups

use std::time::Duration;

use async_trait::async_trait;
use refill_types::{RefillError, RefillResult, TokenMetadata};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::types::TokenInfoResponse;
use crate::token_cache::TokenInfoSource;

/// `TokenInfoSource` backed by the Jupiter token API (`GET {endpoint}/{mint}`)
pub struct JupiterTokenApi {
    http: reqwest::Client,
    endpoint: String,
    cancel: CancellationToken,
}

impl JupiterTokenApi {
    pub fn new(endpoint: &str, timeout: Duration, cancel: CancellationToken) -> RefillResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RefillError::http_error(&format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            cancel,
        })
    }

    async fn request(&self, address: &str) -> RefillResult<TokenInfoResponse> {
        let url = format!("{}/{}", self.endpoint, address);
        debug!(url = %url, "Fetching token info");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RefillError::http_error(&format!("token info {}: {}", address, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RefillError::http_error(&format!("token info {}: {}", address, e)))?;
        if !status.is_success() {
            return Err(RefillError::http_error(&format!(
                "token info {} returned {}: {}",
                address, status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| RefillError::decode_error("token info", &e.to_string()))
    }
}

#[async_trait]
impl TokenInfoSource for JupiterTokenApi {
    async fn fetch_token(&self, address: &str) -> RefillResult<TokenMetadata> {
        let info = tokio::select! {
            _ = self.cancel.cancelled() => return Err(RefillError::cancelled("token info")),
            info = self.request(address) => info?,
        };

        Ok(TokenMetadata::new(&info.address, &info.symbol, &info.name, info.decimals)
            .with_tags(info.tags.unwrap_or_default()))
    }
}
