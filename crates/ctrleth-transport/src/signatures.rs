//! Signature directory client (4byte-compatible API).

use std::time::Duration;

use anyhow::{anyhow, Result};
use ctrleth_types::RetryConfig;
use serde::Deserialize;

use crate::retry::with_retries;

pub const FOURBYTE_DIRECTORY: &str = "https://www.4byte.directory";

#[derive(Debug, Deserialize)]
struct SignatureEntry {
    text_signature: String,
}

#[derive(Debug, Deserialize)]
struct SignaturePage {
    #[serde(default)]
    results: Vec<SignatureEntry>,
}

pub struct SignatureClient {
    base_url: String,
    agent: ureq::Agent,
    retry: RetryConfig,
}

impl SignatureClient {
    pub fn fourbyte() -> Self {
        Self::new(FOURBYTE_DIRECTORY)
    }

    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(20))
                .timeout_connect(Duration::from_secs(10))
                .build(),
            retry: RetryConfig::default(),
        }
    }

    fn lookup(&self, collection: &str, hex_signature: &str) -> Result<Vec<String>> {
        let url = format!("{}/api/v1/{}/", self.base_url, collection);
        let page: SignaturePage = with_retries(self.retry, || {
            self.agent
                .get(&url)
                .query("hex_signature", hex_signature)
                .call()
                .map_err(|e| anyhow!("Signature lookup failed: {}", e))?
                .into_json()
                .map_err(|e| anyhow!("Failed to parse signature response: {}", e))
        })?;
        Ok(dedup_signatures(page))
    }

    /// Text signatures for a 32-byte event topic.
    pub fn event_signatures(&self, topic: &str) -> Result<Vec<String>> {
        self.lookup("event-signatures", topic)
    }

    /// Text signatures for a 4-byte function selector.
    pub fn function_signatures(&self, selector: &str) -> Result<Vec<String>> {
        self.lookup("signatures", selector)
    }
}

fn dedup_signatures(page: SignaturePage) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(page.results.len());
    for entry in page.results {
        if !out.contains(&entry.text_signature) {
            out.push(entry.text_signature);
        }
    }
    out
}
