//! Counters for the request coordinator.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CoordinatorMetrics {
    pub jobs_started: Arc<AtomicU64>,
    /// Start requests that found a job already in flight.
    pub deduplicated: Arc<AtomicU64>,
    pub jobs_failed: Arc<AtomicU64>,
    pub cache_hits: Arc<AtomicU64>,
    /// Loads served from the document store after a cache miss.
    pub document_hits: Arc<AtomicU64>,
}

impl CoordinatorMetrics {
    pub fn record_started(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deduplicated(&self) {
        self.deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_document_hit(&self) {
        self.document_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            jobs_started: self.jobs_started.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            document_hits: self.document_hits.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSnapshot {
    pub jobs_started: u64,
    pub deduplicated: u64,
    pub jobs_failed: u64,
    pub cache_hits: u64,
    pub document_hits: u64,
}

impl CoordinatorSnapshot {
    pub fn format_report(&self) -> String {
        let mut lines = Vec::new();
        lines.push("Coordinator Metrics Report".to_string());
        lines.push("=".repeat(50));
        lines.push(format!("  Jobs started:    {}", self.jobs_started));
        lines.push(format!("  Deduplicated:    {}", self.deduplicated));
        lines.push(format!("  Jobs failed:     {}", self.jobs_failed));
        lines.push(format!("  Cache hits:      {}", self.cache_hits));
        lines.push(format!("  Document hits:   {}", self.document_hits));
        lines.join("\n")
    }
}
