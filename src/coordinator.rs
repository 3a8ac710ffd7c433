//! Single-flight execution of contract analyses.
//!
//! At most one analysis runs per contract address at a time. Start requests
//! are answered synchronously; the job itself runs on the tokio runtime the
//! coordinator was built with, bounded by a worker semaphore.
//!
//! ## Keys
//!
//! | Key | Value | Expiry |
//! |---|---|---|
//! | `once:analysis:<address>` | task id of the in-flight job | `once_ttl` |
//! | `analysis:<address>` | encoded [`CacheRecord`] | never |
//!
//! The in-flight marker lets several processes sharing one cache root see
//! each other's jobs. Within a process, the in-flight map is authoritative.
//!
//! ## Completion
//!
//! A finished job publishes from the blocking pool: the result (or error
//! envelope) is written under one key, the document store receives
//! successful results, the marker is deleted, and only then is the handle
//! retired and waiters woken. Readers therefore see either "in progress" or
//! the complete record.
//!
//! A job dropped before it publishes (runtime shutdown, cancellation) still
//! releases its marker and in-flight entry, so a later start can run it.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use ctrleth_cache::{codec, CacheRecord, DocumentStore, KeyValueCache};
use ctrleth_types::encoding::normalize_address;
use ctrleth_types::{AnalysisResult, TaskError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineArgs;
use crate::engine::AnalysisEngine;
use crate::metrics::CoordinatorMetrics;

pub fn result_key(address: &str) -> String {
    format!("analysis:{}", address)
}

pub fn once_key(address: &str) -> String {
    format!("once:analysis:{}", address)
}

/// Answer to a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StartState {
    /// This request enqueued the job.
    Queued,
    /// A job for the address was already in flight.
    AlreadyQueued,
    /// A result (or error envelope) is already cached; nothing was enqueued.
    Completed,
}

/// What a reader currently sees for an address.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    NotStarted,
    InProgress,
    Ready(Box<AnalysisResult>),
    Failed(TaskError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for a worker slot.
    Waiting,
    Active,
}

/// Public view of an in-flight task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: Uuid,
    pub contract: String,
    pub args: EngineArgs,
    pub started_at: DateTime<Utc>,
    pub status: TaskStatus,
}

struct TaskHandle {
    id: Uuid,
    contract: String,
    args: EngineArgs,
    started_at: DateTime<Utc>,
    running: AtomicBool,
    retired: AtomicBool,
    notify: Arc<Notify>,
}

impl TaskHandle {
    fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            contract: self.contract.clone(),
            args: self.args.clone(),
            started_at: self.started_at,
            status: if self.running.load(Ordering::Acquire) {
                TaskStatus::Active
            } else {
                TaskStatus::Waiting
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub workers: usize,
    pub once_ttl: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            workers: 2,
            once_ttl: Duration::from_secs(1200),
        }
    }
}

struct Shared {
    engine: Arc<dyn AnalysisEngine>,
    cache: Arc<dyn KeyValueCache>,
    documents: Arc<dyn DocumentStore>,
    inflight: Mutex<HashMap<String, Arc<TaskHandle>>>,
    workers: Arc<Semaphore>,
    once_ttl: Duration,
    metrics: CoordinatorMetrics,
}

#[derive(Clone)]
pub struct RequestCoordinator {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl RequestCoordinator {
    pub fn new(
        engine: Arc<dyn AnalysisEngine>,
        cache: Arc<dyn KeyValueCache>,
        documents: Arc<dyn DocumentStore>,
        options: CoordinatorOptions,
        runtime: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine,
                cache,
                documents,
                inflight: Mutex::new(HashMap::new()),
                workers: Arc::new(Semaphore::new(options.workers.max(1))),
                once_ttl: options.once_ttl,
                metrics: CoordinatorMetrics::default(),
            }),
            runtime,
        }
    }

    pub fn metrics(&self) -> &CoordinatorMetrics {
        &self.shared.metrics
    }

    /// Enqueue an analysis for `address` unless one is in flight or a result
    /// is already cached.
    pub fn start_or_get(&self, address: &str, args: EngineArgs) -> Result<StartState> {
        let address = normalize_address(address);
        let shared = &self.shared;

        let mut inflight = shared.inflight.lock();
        if inflight.contains_key(&address) {
            shared.metrics.record_deduplicated();
            debug!(address = %address, "analysis already in flight");
            return Ok(StartState::AlreadyQueued);
        }
        if shared.cache.get(&result_key(&address))?.is_some() {
            return Ok(StartState::Completed);
        }

        let id = Uuid::new_v4();
        let claimed = shared.cache.set_if_absent(
            &once_key(&address),
            id.to_string().as_bytes(),
            Some(shared.once_ttl),
        )?;
        if !claimed {
            shared.metrics.record_deduplicated();
            debug!(address = %address, "analysis marker held elsewhere");
            return Ok(StartState::AlreadyQueued);
        }

        let handle = Arc::new(TaskHandle {
            id,
            contract: address.clone(),
            args,
            started_at: Utc::now(),
            running: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            notify: Arc::new(Notify::new()),
        });
        inflight.insert(address.clone(), handle.clone());
        drop(inflight);

        shared.metrics.record_started();
        info!(address = %address, task = %id, "analysis queued");
        self.runtime.spawn(run_job(shared.clone(), handle));
        Ok(StartState::Queued)
    }

    /// Current state for `address`. A cache miss falls back to the document
    /// store and re-warms the cache from it.
    pub fn load(&self, address: &str) -> Result<LoadState> {
        let address = normalize_address(address);
        let shared = &self.shared;

        if let Some(bytes) = shared.cache.get(&result_key(&address))? {
            match codec::decode(&bytes) {
                Ok(record) => {
                    shared.metrics.record_cache_hit();
                    return Ok(match record.into_result() {
                        Ok(result) => LoadState::Ready(Box::new(result)),
                        Err(envelope) => LoadState::Failed(envelope),
                    });
                }
                Err(e) => warn!(address = %address, error = %e, "discarding unreadable cache entry"),
            }
        }

        if shared.inflight.lock().contains_key(&address)
            || shared.cache.exists(&once_key(&address))
        {
            return Ok(LoadState::InProgress);
        }

        match shared.documents.find_one(&address)? {
            Some(result) => {
                shared.metrics.record_document_hit();
                let record = CacheRecord::analysis(result);
                match codec::encode(&record) {
                    Ok(bytes) => {
                        if let Err(e) = shared.cache.set(&result_key(&address), &bytes, None) {
                            warn!(address = %address, error = %e, "failed to re-warm cache");
                        }
                    }
                    Err(e) => warn!(address = %address, error = %e, "failed to encode document"),
                }
                Ok(match record.into_result() {
                    Ok(result) => LoadState::Ready(Box::new(result)),
                    Err(envelope) => LoadState::Failed(envelope),
                })
            }
            None => Ok(LoadState::NotStarted),
        }
    }

    /// Resolve once the in-flight job for `address` (if any) has published,
    /// then report the state readers see.
    pub async fn wait_for(&self, address: &str) -> Result<LoadState> {
        let address = normalize_address(address);
        loop {
            let current = self.shared.inflight.lock().get(&address).cloned();
            let Some(handle) = current else {
                break;
            };
            let notified = handle.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            // Publishing retires the handle before notifying, so a handle that
            // is still registered here guarantees a wakeup.
            let still_running = self
                .shared
                .inflight
                .lock()
                .get(&address)
                .is_some_and(|current| current.id == handle.id);
            if still_running {
                notified.await;
            }
        }
        self.load(&address)
    }

    /// Every in-flight task, oldest first.
    pub fn tasks(&self) -> Vec<TaskInfo> {
        let mut tasks: Vec<TaskInfo> = self
            .shared
            .inflight
            .lock()
            .values()
            .map(|handle| handle.info())
            .collect();
        tasks.sort_by_key(|t| t.started_at);
        tasks
    }

    /// Contracts with a stored successful analysis.
    pub fn contracts(&self) -> Result<Vec<String>> {
        self.shared.documents.list_contracts()
    }
}

/// Retires the handle if the job future is dropped before publishing.
struct RetireOnDrop {
    shared: Arc<Shared>,
    handle: Arc<TaskHandle>,
}

impl Drop for RetireOnDrop {
    fn drop(&mut self) {
        if !self.handle.retired.load(Ordering::Acquire) {
            warn!(address = %self.handle.contract, task = %self.handle.id, "analysis dropped before publishing");
            self.shared.retire(&self.handle);
        }
    }
}

async fn run_job(shared: Arc<Shared>, handle: Arc<TaskHandle>) {
    let _guard = RetireOnDrop {
        shared: shared.clone(),
        handle: handle.clone(),
    };
    // The semaphore is never closed, so acquisition only fails on shutdown.
    let _permit = shared.workers.clone().acquire_owned().await.ok();
    handle.running.store(true, Ordering::Release);
    info!(address = %handle.contract, task = %handle.id, engine = shared.engine.name(), "analysis started");

    let job = tokio::task::spawn_blocking({
        let shared = shared.clone();
        let handle = handle.clone();
        move || {
            let outcome = shared.execute(&handle);
            shared.publish(&handle, outcome);
        }
    });
    if let Err(e) = job.await {
        error!(address = %handle.contract, task = %handle.id, error = %e, "analysis task lost");
    }
}

impl Shared {
    fn execute(&self, handle: &TaskHandle) -> Result<AnalysisResult, TaskError> {
        let address = &handle.contract;
        let run = panic::catch_unwind(AssertUnwindSafe(|| {
            self.engine
                .analyze(address, &handle.args)
                .map(|output| ctrleth_graph::assemble(address, output))
        }));
        match run {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(TaskError::from_anyhow(e)),
            Err(payload) => Err(TaskError::engine_failure(format!(
                "Analysis task aborted: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    /// Blocking: writes the record, then retires the handle.
    fn publish(&self, handle: &TaskHandle, outcome: Result<AnalysisResult, TaskError>) {
        let address = &handle.contract;
        match &outcome {
            Ok(result) => info!(
                address = %address,
                task = %handle.id,
                blocks = result.blocks.len(),
                elapsed_ms = (Utc::now() - handle.started_at).num_milliseconds(),
                "analysis finished"
            ),
            Err(e) => {
                self.metrics.record_failed();
                warn!(address = %address, task = %handle.id, status = e.status, error = %e.message, "analysis failed");
            }
        }

        let record = CacheRecord::from(outcome);
        let bytes = codec::encode(&record).or_else(|e| {
            error!(address = %address, error = %e, "failed to encode analysis");
            codec::encode(&CacheRecord::TaskError(TaskError::engine_failure(
                "Failed to encode analysis result",
            )))
        });
        match bytes {
            Ok(bytes) => {
                if let Err(e) = self.cache.set(&result_key(address), &bytes, None) {
                    error!(address = %address, error = %e, "failed to cache analysis");
                }
            }
            Err(e) => error!(address = %address, error = %e, "failed to encode error envelope"),
        }
        if let CacheRecord::Analysis(result) = &record {
            if let Err(e) = self.documents.insert_one(result) {
                warn!(address = %address, error = %e, "failed to store analysis document");
            }
        }
        self.retire(handle);
    }

    /// Clear the marker, drop the in-flight entry, wake waiters. Idempotent.
    fn retire(&self, handle: &TaskHandle) {
        if handle.retired.swap(true, Ordering::AcqRel) {
            return;
        }
        let address = &handle.contract;
        if let Err(e) = self.cache.delete(&once_key(address)) {
            warn!(address = %address, error = %e, "failed to clear analysis marker");
        }
        {
            let mut inflight = self.inflight.lock();
            if inflight.get(address).is_some_and(|current| current.id == handle.id) {
                inflight.remove(address);
            }
        }
        handle.notify.notify_waiters();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "engine panicked"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctrleth_cache::{MemoryCache, MemoryDocumentStore};
    use ctrleth_types::EngineOutput;

    const ADDRESS: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";

    struct EmptyEngine;

    impl AnalysisEngine for EmptyEngine {
        fn analyze(&self, _address: &str, _args: &EngineArgs) -> Result<EngineOutput> {
            Ok(EngineOutput::default())
        }

        fn name(&self) -> &str {
            "empty"
        }
    }

    fn coordinator(cache: Arc<MemoryCache>) -> RequestCoordinator {
        RequestCoordinator::new(
            Arc::new(EmptyEngine),
            cache,
            Arc::new(MemoryDocumentStore::new()),
            CoordinatorOptions::default(),
            Handle::current(),
        )
    }

    #[test]
    fn test_keys() {
        assert_eq!(result_key(ADDRESS), format!("analysis:{}", ADDRESS));
        assert_eq!(once_key(ADDRESS), format!("once:analysis:{}", ADDRESS));
    }

    #[tokio::test]
    async fn test_marker_from_another_process_blocks_start() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .set(&once_key(ADDRESS), b"other", Some(Duration::from_secs(60)))
            .unwrap();
        let coordinator = coordinator(cache);

        let state = coordinator.start_or_get(ADDRESS, EngineArgs::default()).unwrap();
        assert_eq!(state, StartState::AlreadyQueued);
        assert_eq!(coordinator.load(ADDRESS).unwrap(), LoadState::InProgress);
        assert!(coordinator.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_address_is_normalized() {
        let coordinator = coordinator(Arc::new(MemoryCache::new()));
        let upper = "0xC02AAA39B223FE8D0A0E5C4F27EAD9083C756CC2";
        assert_eq!(
            coordinator.start_or_get(upper, EngineArgs::default()).unwrap(),
            StartState::Queued
        );
        let result = match coordinator.wait_for(ADDRESS).await.unwrap() {
            LoadState::Ready(result) => result,
            other => panic!("expected a result, got {:?}", other),
        };
        assert_eq!(result.contract, ADDRESS);
        assert_eq!(
            coordinator.start_or_get(ADDRESS, EngineArgs::default()).unwrap(),
            StartState::Completed
        );
    }

    #[tokio::test]
    async fn test_wait_without_task_returns_immediately() {
        let coordinator = coordinator(Arc::new(MemoryCache::new()));
        assert_eq!(coordinator.wait_for(ADDRESS).await.unwrap(), LoadState::NotStarted);
    }
}
