//! Live storage values for `SLOAD`s with a concrete slot.

use std::collections::HashMap;
use std::sync::Arc;

use ctrleth_types::annotation::StorageLoad;
use ctrleth_types::encoding::format_hex;
use ctrleth_types::{Annotation, BasicBlock, PcToBlock, Word};
use tracing::{debug, warn};

use crate::provider::ChainStateProvider;
use crate::ResolveStats;

pub struct StorageResolver {
    provider: Arc<dyn ChainStateProvider>,
}

impl StorageResolver {
    pub fn new(provider: Arc<dyn ChainStateProvider>) -> Self {
        Self { provider }
    }

    /// Attach `concreteValue` (and `concreteValueText` when printable) to the
    /// `StorageLoad` annotations of every instruction that reads a concrete slot.
    ///
    /// Each distinct slot is fetched once per call. Symbolic slots, provider
    /// failures and pcs outside `pc_to_block` leave the graph unchanged.
    pub fn resolve(
        &self,
        address: &str,
        reads: &[StorageLoad],
        blocks: &mut [BasicBlock],
        pc_to_block: &PcToBlock,
    ) -> ResolveStats {
        let mut stats = ResolveStats::default();
        let mut fetched: HashMap<Word, Option<Vec<u8>>> = HashMap::new();

        for read in reads {
            let Some(slot) = read.slot.as_concrete() else {
                stats.unresolved += 1;
                continue;
            };
            let value = fetched
                .entry(slot.clone())
                .or_insert_with(|| self.fetch(address, slot))
                .clone();
            let Some(bytes) = value else {
                stats.unresolved += 1;
                continue;
            };
            if attach_value(blocks, pc_to_block, read.pc, &bytes) {
                stats.resolved += 1;
            } else {
                debug!(pc = read.pc, "storage read outside known blocks");
                stats.skipped += 1;
            }
        }
        stats
    }

    fn fetch(&self, address: &str, slot: &Word) -> Option<Vec<u8>> {
        match self.provider.get_storage_at(address, &slot.to_hex()) {
            Ok(value) => value,
            Err(e) => {
                warn!(address, slot = %slot, error = %e, "storage lookup failed");
                None
            }
        }
    }
}

fn attach_value(blocks: &mut [BasicBlock], pc_to_block: &PcToBlock, pc: u64, bytes: &[u8]) -> bool {
    let Some(inst) = pc_to_block
        .get(pc)
        .and_then(|i| blocks.get_mut(i))
        .and_then(|block| block.instruction_at_mut(pc))
    else {
        return false;
    };
    let hex = format_hex(bytes);
    let text = decode_text(bytes);
    for annotation in &mut inst.annotations {
        if let Annotation::StorageLoad(load) = annotation {
            load.concrete_value = Some(hex.clone());
            load.concrete_value_text = text.clone();
        }
    }
    true
}

/// Printable text held in a storage word, if any.
///
/// Solidity packs strings shorter than 32 bytes into a single slot: the text
/// left-aligned, the lowest byte holding `2 * len`. Other words are read as
/// NUL-padded ASCII.
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    let text = match short_string(bytes) {
        Some(s) => s,
        None => {
            let start = bytes.iter().position(|b| *b != 0)?;
            let end = bytes.iter().rposition(|b| *b != 0)? + 1;
            &bytes[start..end]
        }
    };
    if text.is_empty() || !text.iter().all(|b| (0x20..0x7f).contains(b)) {
        return None;
    }
    String::from_utf8(text.to_vec()).ok()
}

fn short_string(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.len() != 32 {
        return None;
    }
    let marker = bytes[31];
    if marker % 2 != 0 {
        return None;
    }
    let len = usize::from(marker / 2);
    if len == 0 || len > 31 || bytes[len..31].iter().any(|b| *b != 0) {
        return None;
    }
    Some(&bytes[..len])
}
