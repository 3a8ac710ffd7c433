//! Request-level facade over the coordinator, resolvers and lookups.
//!
//! Every operation answers with a value or a [`TaskError`] envelope, so a
//! transport layer (CLI, HTTP) can surface `{message, status}` verbatim.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use ctrleth_cache::{FsCache, FsDocumentStore};
use ctrleth_graph::add_symbolics;
use ctrleth_resolver::events::SIGNATURE_SEPARATOR;
use ctrleth_resolver::{
    AggregateProvider, ChainStateProvider, EventResolver, SignatureIndex, StorageResolver,
};
use ctrleth_transport::{EtherscanClient, NodeClient, SignatureClient};
use ctrleth_types::encoding::{format_hex, parse_address, parse_selector, parse_topic};
use ctrleth_types::{AnalysisResult, BlockView, FullResult, TaskError, Word};
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::config::{EngineArgs, ServiceConfig};
use crate::coordinator::{
    CoordinatorOptions, LoadState, RequestCoordinator, StartState, TaskInfo,
};
use crate::engine::AnalysisEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PendingState {
    NotStarted,
    InProgress,
}

/// Answer to `load_analysis`: a pending marker or the whole graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LoadResponse {
    Pending { state: PendingState },
    Ready(Box<FullResult>),
}

impl LoadResponse {
    pub fn not_started() -> Self {
        Self::Pending {
            state: PendingState::NotStarted,
        }
    }

    pub fn in_progress() -> Self {
        Self::Pending {
            state: PendingState::InProgress,
        }
    }
}

pub struct DisassemblyService {
    coordinator: RequestCoordinator,
    chain: Arc<dyn ChainStateProvider>,
    signatures: Arc<dyn SignatureIndex>,
    storage: StorageResolver,
    events: EventResolver,
    engine_defaults: EngineArgs,
}

impl DisassemblyService {
    pub fn new(
        coordinator: RequestCoordinator,
        chain: Arc<dyn ChainStateProvider>,
        signatures: Arc<dyn SignatureIndex>,
    ) -> Self {
        Self {
            coordinator,
            storage: StorageResolver::new(chain.clone()),
            events: EventResolver::new(signatures.clone()),
            chain,
            signatures,
            engine_defaults: EngineArgs::from_env(),
        }
    }

    /// Filesystem-backed service rooted at `config.home`. Must be called
    /// from within a tokio runtime.
    pub fn from_config(config: &ServiceConfig, engine: Arc<dyn AnalysisEngine>) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| anyhow!("Analysis service needs a tokio runtime: {}", e))?;
        let coordinator = RequestCoordinator::new(
            engine,
            Arc::new(FsCache::new(&config.home)?),
            Arc::new(FsDocumentStore::new(&config.home)?),
            CoordinatorOptions {
                workers: config.workers,
                once_ttl: config.once_ttl,
            },
            runtime,
        );
        let signatures = Arc::new(SignatureClient::new(&config.signature_url));
        Ok(Self::new(coordinator, Arc::new(chain_provider(config)), signatures)
            .with_engine_defaults(config.engine_args()))
    }

    pub fn with_engine_defaults(mut self, args: EngineArgs) -> Self {
        self.engine_defaults = args;
        self
    }

    pub fn engine_defaults(&self) -> &EngineArgs {
        &self.engine_defaults
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    pub fn start_analysis(&self, address: &str, args: EngineArgs) -> Result<StartState, TaskError> {
        let address = validate_address(address)?;
        self.coordinator
            .start_or_get(&address, args)
            .map_err(TaskError::from_anyhow)
    }

    /// Serve the analysis for `address`, enriched with live storage values
    /// and event names.
    pub fn load_analysis(&self, address: &str) -> Result<LoadResponse, TaskError> {
        let address = validate_address(address)?;
        self.check_code(&address)?;

        match self
            .coordinator
            .load(&address)
            .map_err(TaskError::from_anyhow)?
        {
            LoadState::NotStarted => Ok(LoadResponse::not_started()),
            LoadState::InProgress => Ok(LoadResponse::in_progress()),
            LoadState::Failed(envelope) => Err(envelope),
            LoadState::Ready(result) => Ok(LoadResponse::Ready(Box::new(self.enrich(*result)))),
        }
    }

    /// Wait for the in-flight job on `address`, then load it.
    pub async fn wait_and_load(&self, address: &str) -> Result<LoadResponse, TaskError> {
        let address = validate_address(address)?;
        self.coordinator
            .wait_for(&address)
            .await
            .map_err(TaskError::from_anyhow)?;
        self.load_analysis(&address)
    }

    fn check_code(&self, address: &str) -> Result<(), TaskError> {
        let code = self
            .chain
            .get_code(address)
            .map_err(|e| provider_error(e, "Could not fetch contract code"))?;
        match code.as_deref() {
            None => Err(TaskError::bad_input("Not a valid address")),
            Some("0x") | Some("") => Err(TaskError::not_found("No bytecode at address")),
            Some(_) => Ok(()),
        }
    }

    /// Resolvers first, on the stored blocks; then the read-side view with
    /// fresh type tags and function names.
    pub fn enrich(&self, result: AnalysisResult) -> FullResult {
        let AnalysisResult {
            contract,
            mut blocks,
            links,
            pc_to_block,
            symbolic_summary,
            functions,
            coverage,
        } = result;

        let storage = self.storage.resolve(
            &contract,
            &symbolic_summary.storage_reads,
            &mut blocks,
            &pc_to_block,
        );
        let events = self
            .events
            .resolve(&symbolic_summary.logs, &mut blocks, &pc_to_block);
        debug!(
            contract = %contract,
            storage_resolved = storage.resolved,
            events_resolved = events.resolved,
            skipped = storage.skipped + events.skipped,
            "enriched analysis"
        );

        let mut views: Vec<BlockView> = blocks.into_iter().map(BlockView::from).collect();
        add_symbolics(&symbolic_summary, &mut views, &pc_to_block);

        FullResult {
            blocks: views,
            links,
            functions,
            coverage,
        }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Storage word at `slot` (decimal or `0x` hex) as `0x` hex.
    pub fn storage_lookup(&self, address: &str, slot: &str) -> Result<String, TaskError> {
        let address = validate_address(address)?;
        if slot.trim().is_empty() {
            return Err(TaskError::bad_input("Slot parameter missing"));
        }
        let slot = Word::parse(slot).map_err(|_| TaskError::bad_input("Invalid value given"))?;

        match self.chain.get_storage_at(&address, &slot.to_hex()) {
            Ok(Some(bytes)) => Ok(format_hex(&bytes)),
            Ok(None) => Err(TaskError::not_found("Could not resolve storage of contract")),
            Err(e) => match e.downcast::<TaskError>() {
                Ok(envelope) => Err(envelope),
                Err(e) => {
                    warn!(address = %address, slot = %slot, error = %e, "storage lookup failed");
                    Err(TaskError::not_found("Could not resolve storage of contract"))
                }
            },
        }
    }

    /// Candidate event signatures for a topic hash, joined with `" or "`.
    pub fn event_lookup(&self, topic: &str) -> Result<String, TaskError> {
        let topic = parse_topic(topic).map_err(|_| TaskError::bad_input("Invalid value given"))?;
        signature_answer(self.signatures.event_name(&topic), &topic)
    }

    /// Candidate function signatures for a 4-byte selector.
    pub fn function_lookup(&self, selector: &str) -> Result<String, TaskError> {
        let selector =
            parse_selector(selector).map_err(|_| TaskError::bad_input("Invalid value given"))?;
        signature_answer(self.signatures.function_name(&selector), &selector)
    }

    pub fn tasks(&self) -> Vec<TaskInfo> {
        self.coordinator.tasks()
    }

    pub fn contracts(&self) -> Result<Vec<String>, TaskError> {
        self.coordinator.contracts().map_err(TaskError::from_anyhow)
    }
}

/// Node first, then Etherscan, for whichever are configured.
pub fn chain_provider(config: &ServiceConfig) -> AggregateProvider {
    let mut providers: Vec<Box<dyn ChainStateProvider>> = Vec::new();
    if let Some(rpc) = &config.rpc_url {
        providers.push(Box::new(NodeClient::with_timeouts(
            rpc,
            config.rpc_timeout,
            config.rpc_timeout.min(std::time::Duration::from_secs(10)),
        )));
    }
    if let Some(token) = &config.etherscan_token {
        providers.push(Box::new(EtherscanClient::new(token)));
    }
    AggregateProvider::new(providers)
}

fn validate_address(address: &str) -> Result<String, TaskError> {
    parse_address(address, "contract address").map_err(|e| TaskError::bad_input(e.to_string()))
}

fn provider_error(err: anyhow::Error, context: &str) -> TaskError {
    match err.downcast::<TaskError>() {
        Ok(envelope) => envelope,
        Err(e) => TaskError::provider_failure(format!("{}: {:#}", context, e)),
    }
}

fn signature_answer(found: Result<Vec<String>>, hash: &str) -> Result<String, TaskError> {
    match found {
        Ok(names) if !names.is_empty() => Ok(names.join(SIGNATURE_SEPARATOR)),
        Ok(_) => Err(TaskError::not_found("Could not retrieve signature")),
        Err(e) => {
            warn!(hash, error = %e, "signature lookup failed");
            Err(TaskError::not_found("Could not retrieve signature"))
        }
    }
}
