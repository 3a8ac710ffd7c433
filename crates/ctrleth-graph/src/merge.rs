//! Attaching engine facts to instructions.
//!
//! Sources are merged in a fixed precedence: every fact from the first source
//! valid at a pc is attached before any fact from the second. The trace
//! summary goes first, then the symbolic summary. Tagging breaks ties on
//! first-attached, so this order is observable downstream.

use std::collections::BTreeMap;

use ctrleth_types::{Annotation, AnnotationSource, AssemblySummary, RawBlock, SymbolicSummary};

/// Facts of one source bucketed by the pcs they are valid at.
struct PcIndex {
    by_pc: BTreeMap<u64, Vec<Annotation>>,
}

impl PcIndex {
    fn build(source: &dyn AnnotationSource) -> Self {
        let mut by_pc: BTreeMap<u64, Vec<Annotation>> = BTreeMap::new();
        for annotation in source.all_annotations() {
            for pc in annotation.valid_pcs() {
                by_pc.entry(pc).or_default().push(annotation.clone());
            }
        }
        Self { by_pc }
    }

    fn at(&self, pc: u64) -> &[Annotation] {
        self.by_pc.get(&pc).map(Vec::as_slice).unwrap_or(&[])
    }
}

pub struct AnnotationMerger {
    /// In precedence order.
    sources: Vec<PcIndex>,
}

impl AnnotationMerger {
    /// Trace facts first, then symbolic facts.
    pub fn new(trace: &AssemblySummary, symbolic: &SymbolicSummary) -> Self {
        Self::with_sources(&[trace as &dyn AnnotationSource, symbolic])
    }

    pub fn with_sources(sources: &[&dyn AnnotationSource]) -> Self {
        Self {
            sources: sources.iter().map(|s| PcIndex::build(*s)).collect(),
        }
    }

    /// Append every source's facts to each instruction of `block`, then
    /// propagate the block-scoped annotations inward.
    pub fn merge_block(&self, block: &mut RawBlock) {
        for inst in &mut block.instructions {
            let pc = inst.pc();
            for source in &self.sources {
                inst.annotations.extend(source.at(pc).iter().cloned());
            }
        }
        propagate_block_annotations(block);
    }
}

/// Copy block-scoped annotations onto the instructions they are valid at.
/// An instruction that already carries an equal annotation is left alone.
pub fn propagate_block_annotations(block: &mut RawBlock) {
    if block.annotations.is_empty() {
        return;
    }
    for inst in &mut block.instructions {
        let pc = inst.pc();
        for annotation in &block.annotations {
            if annotation.valid_at(pc) && !inst.annotations.contains(annotation) {
                inst.annotations.push(annotation.clone());
            }
        }
    }
}
