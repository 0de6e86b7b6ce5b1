//! Block explorer status queries.

use std::time::Duration;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;

/// Default Etherscan v2 multichain API endpoint.
pub const DEFAULT_EXPLORER_API_URL: &str = "https://api.etherscan.io/v2/api";

/// Default timeout for explorer requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Generic Etherscan API envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    message: String,
    result: serde_json::Value,
}

/// Client for the Etherscan-compatible contract API.
#[derive(Debug, Clone)]
pub struct EtherscanClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    chain_id: u64,
}

impl EtherscanClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, chain_id: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            chain_id,
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Whether the explorer serves an ABI for `address`.
    pub async fn is_verified(&self, address: Address) -> Result<bool> {
        let chain_id = self.chain_id.to_string();
        let address = address.to_checksum(None);

        let response: ApiResponse = self
            .client
            .get(&self.api_url)
            .query(&[
                ("chainid", chain_id.as_str()),
                ("module", "contract"),
                ("action", "getabi"),
                ("address", address.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("Failed to send getabi request")?
            .error_for_status()
            .context("Explorer returned an error status")?
            .json()
            .await
            .context("Failed to parse getabi response")?;

        interpret_getabi(&response)
    }
}

/// Map a `getabi` response to verified / not verified / error.
fn interpret_getabi(response: &ApiResponse) -> Result<bool> {
    if response.status == "1" {
        return Ok(true);
    }

    let detail = response.result.as_str().unwrap_or_default();
    if detail.to_ascii_lowercase().contains("not verified") {
        return Ok(false);
    }

    anyhow::bail!("Explorer error: {} ({})", response.message, detail)
}
