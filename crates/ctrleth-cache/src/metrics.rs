//! Counters for key-value cache operations.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Thread-safe counters, cheap to clone and share between cache handles.
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    pub gets: Arc<AtomicU64>,
    pub hits: Arc<AtomicU64>,
    /// Entries found but past their expiry.
    pub expired: Arc<AtomicU64>,
    pub writes: Arc<AtomicU64>,
    pub deletes: Arc<AtomicU64>,
    /// `set_if_absent` calls that lost to an existing entry.
    pub contended: Arc<AtomicU64>,
}

impl CacheMetrics {
    pub fn record_get(&self, hit: bool) {
        self.gets.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_contended(&self) {
        self.contended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub gets: u64,
    pub hits: u64,
    pub expired: u64,
    pub writes: u64,
    pub deletes: u64,
    pub contended: u64,
}

impl MetricsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        if self.gets == 0 {
            return 0.0;
        }
        self.hits as f64 / self.gets as f64
    }

    pub fn format_report(&self) -> String {
        let mut lines = Vec::new();
        lines.push("Cache Metrics Report".to_string());
        lines.push("=".repeat(50));
        lines.push(format!("  Gets:            {}", self.gets));
        lines.push(format!("  Hits:            {}", self.hits));
        lines.push(format!("  Expired:         {}", self.expired));
        lines.push(format!("  Hit Rate:        {:.1}%", self.hit_rate() * 100.0));
        lines.push(format!("  Writes:          {}", self.writes));
        lines.push(format!("  Deletes:         {}", self.deletes));
        lines.push(format!("  Contended sets:  {}", self.contended));
        lines.join("\n")
    }
}
