//! Event names for `LOG`s with a concrete `topic0`.

use std::collections::HashMap;
use std::sync::Arc;

use ctrleth_types::annotation::Log;
use ctrleth_types::{Annotation, BasicBlock, PcToBlock};
use tracing::{debug, warn};

use crate::provider::SignatureIndex;
use crate::ResolveStats;

/// Separator between candidate signatures sharing one hash.
pub const SIGNATURE_SEPARATOR: &str = " or ";

pub struct EventResolver {
    index: Arc<dyn SignatureIndex>,
}

impl EventResolver {
    pub fn new(index: Arc<dyn SignatureIndex>) -> Self {
        Self { index }
    }

    /// Candidate names for a padded topic hash, joined with `" or "`.
    /// `None` when nothing matched or the lookup failed.
    pub fn lookup(&self, topic_hex: &str) -> Option<String> {
        match self.index.event_name(topic_hex) {
            Ok(names) if !names.is_empty() => Some(names.join(SIGNATURE_SEPARATOR)),
            Ok(_) => None,
            Err(e) => {
                warn!(topic = topic_hex, error = %e, "event signature lookup failed");
                None
            }
        }
    }

    /// Attach `name` to the `Log` annotations of every instruction whose
    /// `topic0` is concrete and known to the index.
    pub fn resolve(
        &self,
        logs: &[Log],
        blocks: &mut [BasicBlock],
        pc_to_block: &PcToBlock,
    ) -> ResolveStats {
        let mut stats = ResolveStats::default();
        let mut names: HashMap<String, Option<String>> = HashMap::new();

        for log in logs {
            let Some(topic) = log.topic0.as_ref().and_then(|t| t.as_concrete()) else {
                stats.unresolved += 1;
                continue;
            };
            let topic_hex = topic.to_hex_padded();
            let name = names
                .entry(topic_hex.clone())
                .or_insert_with(|| self.lookup(&topic_hex))
                .clone();
            let Some(name) = name else {
                stats.unresolved += 1;
                continue;
            };
            if attach_name(blocks, pc_to_block, log.pc, &name) {
                stats.resolved += 1;
            } else {
                debug!(pc = log.pc, "log outside known blocks");
                stats.skipped += 1;
            }
        }
        stats
    }
}

fn attach_name(blocks: &mut [BasicBlock], pc_to_block: &PcToBlock, pc: u64, name: &str) -> bool {
    let Some(inst) = pc_to_block
        .get(pc)
        .and_then(|i| blocks.get_mut(i))
        .and_then(|block| block.instruction_at_mut(pc))
    else {
        return false;
    };
    for annotation in &mut inst.annotations {
        if let Annotation::Log(log) = annotation {
            log.name = Some(name.to_string());
        }
    }
    true
}
