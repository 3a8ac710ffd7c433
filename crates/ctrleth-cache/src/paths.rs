//! Filesystem layout of the cache root.
//!
//! ```text
//! <root>/kv/<ns>/.../<name>.entry           key-value entries, one dir per `:` segment
//! <root>/contracts/<aa>/<address>.json      documents, sharded by address prefix
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Result};

static TMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Path of a key-value entry. Keys are `:`-separated and every segment must
/// be a plain file name.
pub fn kv_entry_path(cache_root: &Path, key: &str) -> Result<PathBuf> {
    let segments: Vec<&str> = key.split(':').collect();
    let mut path = cache_root.join("kv");
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty()
            || *segment == "."
            || *segment == ".."
            || segment.contains(['/', '\\'])
        {
            return Err(anyhow!("Invalid cache key '{}'", key));
        }
        if i + 1 == segments.len() {
            path = path.join(format!("{}.entry", segment));
        } else {
            path = path.join(segment);
        }
    }
    Ok(path)
}

/// Two hex digits after the `0x` prefix.
pub fn contract_shard(address: &str) -> String {
    let hex = address.strip_prefix("0x").unwrap_or(address);
    hex.get(0..2).unwrap_or("00").to_lowercase()
}

pub fn contracts_dir(cache_root: &Path) -> PathBuf {
    cache_root.join("contracts")
}

pub fn contract_path(cache_root: &Path, address: &str) -> PathBuf {
    contracts_dir(cache_root)
        .join(contract_shard(address))
        .join(format!("{}.json", address.to_lowercase()))
}

pub fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow!("Failed to create directory {}: {}", parent.display(), e))?;
    }
    Ok(())
}

/// Unique per process and call, so concurrent writers never share a temp file.
fn tmp_sibling(path: &Path) -> PathBuf {
    path.with_extension(format!(
        "{}.{}.{}.tmp",
        path.extension().and_then(|s| s.to_str()).unwrap_or("tmp"),
        std::process::id(),
        TMP_SEQUENCE.fetch_add(1, Ordering::Relaxed)
    ))
}

fn write_tmp(path: &Path, contents: &[u8]) -> Result<PathBuf> {
    ensure_parent_dirs(path)?;
    let tmp_path = tmp_sibling(path);
    std::fs::write(&tmp_path, contents)
        .map_err(|e| anyhow!("Failed to write temp file {}: {}", tmp_path.display(), e))?;
    Ok(tmp_path)
}

/// Write to a sibling temp file, then rename over `path`. Readers see the old
/// contents or the new ones, never a prefix.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = write_tmp(path, contents)?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        anyhow!(
            "Failed to rename {} to {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })?;
    Ok(())
}

/// Create `path` with `contents` only if nothing exists there yet. The file
/// is complete before it becomes visible; `false` means another writer (in
/// any process) got there first.
pub fn create_exclusive(path: &Path, contents: &[u8]) -> Result<bool> {
    let tmp_path = write_tmp(path, contents)?;
    let linked = std::fs::hard_link(&tmp_path, path);
    let _ = std::fs::remove_file(&tmp_path);
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(anyhow!("Failed to create {}: {}", path.display(), e)),
    }
}

pub fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec(value).map_err(|e| anyhow!("Failed to serialize JSON: {}", e))?;
    atomic_write(path, &json)
}
