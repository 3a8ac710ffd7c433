//! Etherscan proxy client, used when no node endpoint is configured or the
//! node has no answer.

use std::time::Duration;

use anyhow::{anyhow, Result};
use ctrleth_types::RetryConfig;
use serde_json::Value;

use crate::node::into_hex_string;
use crate::retry::with_retries;

pub const ETHERSCAN_MAINNET: &str = "https://api.etherscan.io/api";

pub struct EtherscanClient {
    endpoint: String,
    api_key: String,
    agent: ureq::Agent,
    retry: RetryConfig,
}

impl EtherscanClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_endpoint(ETHERSCAN_MAINNET, api_key)
    }

    pub fn with_endpoint(endpoint: &str, api_key: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(30))
                .timeout_connect(Duration::from_secs(10))
                .build(),
            retry: RetryConfig::default(),
        }
    }

    fn proxy(&self, action: &str, params: &[(&str, &str)]) -> Result<Option<String>> {
        let response: Value = with_retries(self.retry, || {
            let mut request = self
                .agent
                .get(&self.endpoint)
                .query("module", "proxy")
                .query("action", action)
                .query("tag", "latest")
                .query("apikey", &self.api_key);
            for (key, value) in params {
                request = request.query(key, value);
            }
            request
                .call()
                .map_err(|e| anyhow!("Etherscan {} request failed: {}", action, e))?
                .into_json()
                .map_err(|e| anyhow!("Failed to parse Etherscan {} response: {}", action, e))
        })?;
        parse_proxy_response(action, response)
    }

    pub fn get_storage_at(&self, address: &str, slot: &str) -> Result<Option<String>> {
        self.proxy("eth_getStorageAt", &[("address", address), ("position", slot)])
    }

    pub fn get_code(&self, address: &str) -> Result<Option<String>> {
        self.proxy("eth_getCode", &[("address", address)])
    }
}

/// Proxy answers are JSON-RPC shaped on success. Failures come back as
/// `{"status": "0", "message": "NOTOK", "result": "<reason>"}`, or as a
/// JSON-RPC error object for rejected parameters.
fn parse_proxy_response(action: &str, response: Value) -> Result<Option<String>> {
    if response.get("status").and_then(Value::as_str) == Some("0") {
        let reason = response
            .get("result")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(anyhow!("Etherscan {} failed: {}", action, reason));
    }
    if response.get("error").is_some() {
        return Ok(None);
    }
    match response.get("result") {
        None | Some(Value::Null) => Ok(None),
        Some(result) => into_hex_string(result.clone()).map(Some),
    }
}
