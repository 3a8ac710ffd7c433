//! Storage for analysis results.
//!
//! - [`codec`]: lossless encoding of results and error envelopes
//! - [`kv`]: key-value cache with expiry ([`MemoryCache`], [`FsCache`])
//! - [`document`]: durable per-contract documents ([`FsDocumentStore`], [`MemoryDocumentStore`])
//! - [`metrics`]: cache operation counters
//!
//! # Layout
//!
//! ```text
//! ~/.ctrleth/
//!   kv/analysis/<address>.entry         cached CacheRecord
//!   kv/once/analysis/<address>.entry    in-flight marker
//!   contracts/<aa>/<address>.json       completed analyses
//! ```

pub mod codec;
pub mod document;
pub mod kv;
pub mod metrics;
pub mod paths;

pub use codec::{decode, encode, CacheRecord};
pub use document::{DocumentStore, FsDocumentStore, MemoryDocumentStore};
pub use kv::{FsCache, KeyValueCache, MemoryCache};
pub use metrics::{CacheMetrics, MetricsSnapshot};
