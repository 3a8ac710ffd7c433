//! ctrleth: annotated control-flow graphs for EVM contracts
//!
//! Turns the output of an external disassembler and symbolic executor into a
//! navigable basic-block graph, and makes sure concurrent requests for the
//! same contract share one analysis run:
//!
//! - [`coordinator`]: single-flight job execution and result caching
//! - [`service`]: request facade (start, load with live enrichment, lookups)
//! - [`engine`]: the analysis engine seam
//! - [`config`]: environment-driven service and engine settings
//!
//! Graph assembly lives in `ctrleth-graph`, enrichment in `ctrleth-resolver`
//! and storage in `ctrleth-cache`.

#![allow(clippy::result_large_err)]

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod metrics;
pub mod service;

pub use config::{EngineArgs, SearchStrategy, ServiceConfig};
pub use coordinator::{
    CoordinatorOptions, LoadState, RequestCoordinator, StartState, TaskInfo, TaskStatus,
};
pub use engine::{AnalysisEngine, CommandEngine, FileEngine};
pub use metrics::{CoordinatorMetrics, CoordinatorSnapshot};
pub use service::{DisassemblyService, LoadResponse, PendingState};

pub use ctrleth_types::{AnalysisResult, ErrorKind, FullResult, TaskError};
