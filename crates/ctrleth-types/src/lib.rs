//! Shared data model for the ctrleth workspace.
//!
//! - [`annotation`]: the closed set of per-instruction facts
//! - [`block`]: instructions, raw engine blocks and assembled blocks
//! - [`summary`]: trace and symbolic summaries produced by the engine
//! - [`analysis`]: the assembled [`AnalysisResult`] and the read-side views
//! - [`error`]: the `{message, status}` envelope
//! - [`word`]: arbitrary-width EVM words with lossless JSON encoding

pub mod analysis;
pub mod annotation;
pub mod block;
pub mod encoding;
pub mod env_utils;
pub mod error;
pub mod summary;
pub mod word;

pub use analysis::{
    AnalysisResult, BlockType, BlockView, Coverage, EntryPoint, FullResult, FunctionOverview,
    JumpEdge, PcToBlock,
};
pub use annotation::{Annotation, FunctionSummary, SymbolicVariable, Tags};
pub use block::{BasicBlock, Instruction, Opcode, RawBlock};
pub use error::{ErrorKind, TaskError};
pub use summary::{AnnotationSource, AssemblySummary, EngineOutput, SymbolicSummary};
pub use word::Word;

use std::time::Duration;

/// Retry behavior for calls to external providers.
#[derive(Debug, Copy, Clone)]
pub struct RetryConfig {
    pub retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryConfig {
    pub fn new(retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_millis(2000),
        }
    }
}
