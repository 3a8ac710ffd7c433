//! Durable store of completed analyses, one document per contract.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use ctrleth_types::AnalysisResult;
use parking_lot::RwLock;

use crate::codec::{decode_analysis, encode_analysis};
use crate::paths::{atomic_write, contract_path, contracts_dir};

pub trait DocumentStore: Send + Sync {
    /// Insert or replace the document for `result.contract`.
    fn insert_one(&self, result: &AnalysisResult) -> Result<()>;

    fn find_one(&self, contract: &str) -> Result<Option<AnalysisResult>>;

    /// Distinct contract addresses with a stored document, sorted.
    fn list_contracts(&self) -> Result<Vec<String>>;
}

// =============================================================================
// Filesystem store
// =============================================================================

pub struct FsDocumentStore {
    cache_root: Arc<Path>,
}

impl FsDocumentStore {
    pub fn new<P: AsRef<Path>>(cache_root: P) -> Result<Self> {
        let cache_root = cache_root.as_ref().to_path_buf();
        std::fs::create_dir_all(contracts_dir(&cache_root)).map_err(|e| {
            anyhow!("Failed to create document root {}: {}", cache_root.display(), e)
        })?;
        Ok(Self {
            cache_root: Arc::from(cache_root),
        })
    }
}

impl DocumentStore for FsDocumentStore {
    fn insert_one(&self, result: &AnalysisResult) -> Result<()> {
        let path = contract_path(&self.cache_root, &result.contract);
        atomic_write(&path, &encode_analysis(result)?)
    }

    fn find_one(&self, contract: &str) -> Result<Option<AnalysisResult>> {
        let path = contract_path(&self.cache_root, contract);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(anyhow!("Failed to read document {}: {}", path.display(), e)),
        };
        decode_analysis(&bytes).map(Some)
    }

    fn list_contracts(&self) -> Result<Vec<String>> {
        let root = contracts_dir(&self.cache_root);
        let mut contracts = Vec::new();
        for shard in std::fs::read_dir(&root)
            .map_err(|e| anyhow!("Failed to list {}: {}", root.display(), e))?
        {
            let shard = shard?.path();
            if !shard.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(&shard)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    contracts.push(stem.to_string());
                }
            }
        }
        contracts.sort();
        contracts.dedup();
        Ok(contracts)
    }
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<String, AnalysisResult>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn insert_one(&self, result: &AnalysisResult) -> Result<()> {
        self.documents
            .write()
            .insert(result.contract.to_lowercase(), result.clone());
        Ok(())
    }

    fn find_one(&self, contract: &str) -> Result<Option<AnalysisResult>> {
        Ok(self.documents.read().get(&contract.to_lowercase()).cloned())
    }

    fn list_contracts(&self) -> Result<Vec<String>> {
        Ok(self.documents.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_analysis;

    const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
    const DAI: &str = "0x6b175474e89094c44da98b954eedeac495271d0f";

    fn exercise(store: &dyn DocumentStore) {
        assert_eq!(store.find_one(WETH).unwrap(), None);
        store.insert_one(&sample_analysis(WETH)).unwrap();
        store.insert_one(&sample_analysis(DAI)).unwrap();
        store.insert_one(&sample_analysis(WETH)).unwrap();

        assert_eq!(store.find_one(WETH).unwrap(), Some(sample_analysis(WETH)));
        assert_eq!(store.list_contracts().unwrap(), vec![DAI, WETH]);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryDocumentStore::new());
    }

    #[test]
    fn test_fs_store() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FsDocumentStore::new(dir.path()).unwrap());

        let reopened = FsDocumentStore::new(dir.path()).unwrap();
        assert!(reopened.find_one(DAI).unwrap().is_some());
    }
}
