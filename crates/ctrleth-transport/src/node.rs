//! Ethereum JSON-RPC node client.
//!
//! Only the two state reads the service needs: `eth_getStorageAt` and
//! `eth_getCode`, both against the `latest` block.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use ctrleth_types::RetryConfig;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::retry::with_retries;

/// JSON-RPC "invalid params", returned for malformed addresses.
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

pub struct NodeClient {
    endpoint: String,
    agent: ureq::Agent,
    retry: RetryConfig,
    next_id: AtomicU64,
}

impl NodeClient {
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

    pub fn new(endpoint: &str) -> Self {
        Self::with_timeouts(
            endpoint,
            Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            Duration::from_secs(Self::DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    pub fn with_timeouts(endpoint: &str, timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            agent: ureq::AgentBuilder::new()
                .timeout(timeout)
                .timeout_connect(connect_timeout)
                .build(),
            retry: RetryConfig::default(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Execute one JSON-RPC call. `Ok(None)` when the node answers with a null
    /// result or rejects the parameters.
    fn call(&self, method: &str, params: Value) -> Result<Option<Value>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response: RpcResponse = with_retries(self.retry, || {
            self.agent
                .post(&self.endpoint)
                .set("Content-Type", "application/json")
                .send_json(&body)
                .map_err(|e| anyhow!("{} request failed: {}", method, e))?
                .into_json()
                .map_err(|e| anyhow!("Failed to parse {} response: {}", method, e))
        })?;

        if let Some(error) = response.error {
            if error.code == INVALID_PARAMS {
                return Ok(None);
            }
            return Err(anyhow!("RPC error {}: {}", error.code, error.message));
        }
        Ok(response.result.filter(|v| !v.is_null()))
    }

    /// Raw 32-byte storage word at `slot` (`0x` hex), as `0x` hex.
    pub fn get_storage_at(&self, address: &str, slot: &str) -> Result<Option<String>> {
        let result = self.call("eth_getStorageAt", json!([address, slot, "latest"]))?;
        result.map(into_hex_string).transpose()
    }

    /// Deployed bytecode as `0x` hex; `0x` for accounts without code.
    pub fn get_code(&self, address: &str) -> Result<Option<String>> {
        let result = self.call("eth_getCode", json!([address, "latest"]))?;
        result.map(into_hex_string).transpose()
    }
}

pub(crate) fn into_hex_string(value: Value) -> Result<String> {
    match value {
        Value::String(s) if s.starts_with("0x") => Ok(s),
        other => Err(anyhow!("Expected hex string, got {}", other)),
    }
}
