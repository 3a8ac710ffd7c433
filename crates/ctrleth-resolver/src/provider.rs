//! External collaborators of the resolvers.
//!
//! Resolvers hold these as injected trait objects, so tests substitute fakes
//! without touching network clients.

use anyhow::{anyhow, Result};
use ctrleth_transport::{EtherscanClient, NodeClient, SignatureClient};
use ctrleth_types::encoding::parse_hex_bytes;
use ctrleth_types::TaskError;
use tracing::warn;

/// Read access to live contract state.
pub trait ChainStateProvider: Send + Sync {
    /// Raw storage word at `slot_hex`, or `None` if the provider has no answer.
    fn get_storage_at(&self, address: &str, slot_hex: &str) -> Result<Option<Vec<u8>>>;

    /// Deployed code as `0x` hex. `Some("0x")` for accounts without code,
    /// `None` for addresses the provider rejects.
    fn get_code(&self, address: &str) -> Result<Option<String>>;

    fn name(&self) -> &str;
}

/// Lookup of human-readable signatures by hash.
pub trait SignatureIndex: Send + Sync {
    fn event_name(&self, topic_hex: &str) -> Result<Vec<String>>;

    fn function_name(&self, selector_hex: &str) -> Result<Vec<String>>;
}

impl ChainStateProvider for NodeClient {
    fn get_storage_at(&self, address: &str, slot_hex: &str) -> Result<Option<Vec<u8>>> {
        NodeClient::get_storage_at(self, address, slot_hex)?
            .map(|hex| parse_hex_bytes(&hex, "storage value"))
            .transpose()
    }

    fn get_code(&self, address: &str) -> Result<Option<String>> {
        NodeClient::get_code(self, address)
    }

    fn name(&self) -> &str {
        "node"
    }
}

impl ChainStateProvider for EtherscanClient {
    fn get_storage_at(&self, address: &str, slot_hex: &str) -> Result<Option<Vec<u8>>> {
        EtherscanClient::get_storage_at(self, address, slot_hex)?
            .map(|hex| parse_hex_bytes(&hex, "storage value"))
            .transpose()
    }

    fn get_code(&self, address: &str) -> Result<Option<String>> {
        EtherscanClient::get_code(self, address)
    }

    fn name(&self) -> &str {
        "etherscan"
    }
}

impl SignatureIndex for SignatureClient {
    fn event_name(&self, topic_hex: &str) -> Result<Vec<String>> {
        self.event_signatures(topic_hex)
    }

    fn function_name(&self, selector_hex: &str) -> Result<Vec<String>> {
        self.function_signatures(selector_hex)
    }
}

/// Tries each provider in order; the first one with an answer wins.
///
/// A provider error moves on to the next provider. If every provider failed
/// the last error is returned; if some answered "nothing", so does this.
pub struct AggregateProvider {
    providers: Vec<Box<dyn ChainStateProvider>>,
}

impl AggregateProvider {
    pub fn new(providers: Vec<Box<dyn ChainStateProvider>>) -> Self {
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn first_of<T>(
        &self,
        what: &str,
        f: impl Fn(&dyn ChainStateProvider) -> Result<Option<T>>,
    ) -> Result<Option<T>> {
        if self.providers.is_empty() {
            return Err(anyhow::Error::new(TaskError::configuration_missing(
                "No chain state provider configured (set CTRLETH_RPC or ETHERSCAN_TOKEN)",
            )));
        }
        let mut last_error = None;
        let mut answered = false;
        for provider in &self.providers {
            match f(provider.as_ref()) {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => answered = true,
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "{} failed", what);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if !answered => Err(e),
            _ => Ok(None),
        }
    }
}

impl ChainStateProvider for AggregateProvider {
    fn get_storage_at(&self, address: &str, slot_hex: &str) -> Result<Option<Vec<u8>>> {
        self.first_of("get_storage_at", |p| p.get_storage_at(address, slot_hex))
    }

    fn get_code(&self, address: &str) -> Result<Option<String>> {
        self.first_of("get_code", |p| p.get_code(address))
    }

    fn name(&self) -> &str {
        "aggregate"
    }
}

/// Signature index used when lookups are disabled.
pub struct NoopSignatureIndex;

impl SignatureIndex for NoopSignatureIndex {
    fn event_name(&self, _topic_hex: &str) -> Result<Vec<String>> {
        Err(anyhow!("Signature lookups are disabled"))
    }

    fn function_name(&self, _selector_hex: &str) -> Result<Vec<String>> {
        Err(anyhow!("Signature lookups are disabled"))
    }
}
