//! Block type tags and function attribution for the read-side views.

use std::str::FromStr;

use ctrleth_types::{BlockType, BlockView, PcToBlock, SymbolicSummary};
use tracing::debug;

/// Add `new_type` to the block's tags.
///
/// The result is the union of old and new tags re-sorted to the fixed
/// priority table. Names outside the table are dropped.
pub fn add_type_to_block(block: &mut BlockView, new_type: &str) {
    match BlockType::from_str(new_type) {
        Ok(tag) => add_block_type(block, tag),
        Err(_) => debug!(block = block.i, tag = new_type, "dropping unknown block type"),
    }
}

pub fn add_block_type(block: &mut BlockView, tag: BlockType) {
    if block.types.contains(&tag) {
        return;
    }
    block.types.push(tag);
    block.types.sort_by_key(|t| t.priority());
}

/// Facts whose pc did not resolve to a block during a tagging pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagStats {
    pub tagged: usize,
    pub skipped: usize,
}

fn block_for<'a>(
    blocks: &'a mut [BlockView],
    pc_to_block: &PcToBlock,
    pc: u64,
) -> Option<&'a mut BlockView> {
    let i = pc_to_block.get(pc)?;
    blocks.get_mut(i)
}

/// Set each block's `function` to the name of the function whose pcs it
/// contains. Later functions overwrite earlier ones on overlap.
pub fn attribute_functions(
    summary: &SymbolicSummary,
    blocks: &mut [BlockView],
    pc_to_block: &PcToBlock,
) -> TagStats {
    let mut stats = TagStats::default();
    for function in &summary.functions {
        for pc in &function.pcs {
            match block_for(blocks, pc_to_block, *pc) {
                Some(block) => {
                    block.function = Some(function.name.clone());
                    stats.tagged += 1;
                }
                None => stats.skipped += 1,
            }
        }
    }
    stats
}

/// One tagging pass per fact kind over the whole symbolic summary.
pub fn tag_blocks(
    summary: &SymbolicSummary,
    blocks: &mut [BlockView],
    pc_to_block: &PcToBlock,
) -> TagStats {
    let passes: [(BlockType, Vec<u64>); 14] = [
        (BlockType::Selfdestruct, summary.selfdestructs.iter().map(|f| f.pc).collect()),
        (BlockType::Revert, summary.reverts.iter().map(|f| f.pc).collect()),
        (BlockType::Calls, summary.calls.iter().map(|f| f.pc).collect()),
        (BlockType::Creates, summary.creates.iter().map(|f| f.pc).collect()),
        (BlockType::Creates, summary.create2s.iter().map(|f| f.pc).collect()),
        (BlockType::Returns, summary.returns.iter().map(|f| f.pc).collect()),
        (BlockType::StorageReads, summary.storage_reads.iter().map(|f| f.pc).collect()),
        (BlockType::StorageWrites, summary.storage_writes.iter().map(|f| f.pc).collect()),
        (BlockType::MemoryReads, summary.memory_reads.iter().map(|f| f.pc).collect()),
        (BlockType::MemoryWrites, summary.memory_writes.iter().map(|f| f.pc).collect()),
        (BlockType::Push, summary.pushes.iter().map(|f| f.pc).collect()),
        (BlockType::Logs, summary.logs.iter().map(|f| f.pc).collect()),
        (BlockType::Calldataloads, summary.calldataloads.iter().map(|f| f.pc).collect()),
        (BlockType::Calldatacopies, summary.calldatacopies.iter().map(|f| f.pc).collect()),
    ];

    let mut stats = TagStats::default();
    for (tag, pcs) in passes {
        for pc in pcs {
            match block_for(blocks, pc_to_block, pc) {
                Some(block) => {
                    add_block_type(block, tag);
                    stats.tagged += 1;
                }
                None => stats.skipped += 1,
            }
        }
    }
    stats
}

/// Function attribution followed by type tagging.
pub fn add_symbolics(
    summary: &SymbolicSummary,
    blocks: &mut [BlockView],
    pc_to_block: &PcToBlock,
) -> TagStats {
    let functions = attribute_functions(summary, blocks, pc_to_block);
    let types = tag_blocks(summary, blocks, pc_to_block);
    let stats = TagStats {
        tagged: functions.tagged + types.tagged,
        skipped: functions.skipped + types.skipped,
    };
    if stats.skipped > 0 {
        debug!(skipped = stats.skipped, "facts with unresolved pcs skipped");
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctrleth_types::annotation::{Halt, MemorySlice, Selfdestruct, SymbolicVariable, ValueFact};
    use ctrleth_types::{FunctionSummary, Tags};

    fn view(i: usize) -> BlockView {
        BlockView {
            i,
            instructions: Vec::new(),
            next: None,
            types: Vec::new(),
            function: None,
        }
    }

    fn names(block: &BlockView) -> Vec<&'static str> {
        block.types.iter().map(|t| t.as_str()).collect()
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let mut block = view(0);
        add_type_to_block(&mut block, "push");
        add_type_to_block(&mut block, "selfdestruct");
        add_type_to_block(&mut block, "logs");
        add_type_to_block(&mut block, "dsf");
        assert_eq!(names(&block), vec!["selfdestruct", "logs", "push"]);
    }

    #[test]
    fn test_adding_twice_is_noop() {
        let mut once = view(0);
        add_type_to_block(&mut once, "storageReads");
        let mut twice = once.clone();
        add_type_to_block(&mut twice, "storageReads");
        assert_eq!(once.types, twice.types);
    }

    #[test]
    fn test_unknown_tag_never_appears() {
        let mut block = view(0);
        add_type_to_block(&mut block, "jumps");
        assert!(block.types.is_empty());
    }

    #[test]
    fn test_tag_blocks_skips_unresolved_pcs() {
        let summary = SymbolicSummary {
            pushes: vec![
                ValueFact {
                    pc: 1,
                    tags: Tags::new(),
                    value: None,
                },
                ValueFact {
                    pc: 999,
                    tags: Tags::new(),
                    value: None,
                },
            ],
            reverts: vec![Halt {
                pc: 4,
                tags: Tags::new(),
                data: MemorySlice::default(),
            }],
            selfdestructs: vec![Selfdestruct {
                pc: 1,
                tags: Tags::new(),
                address: SymbolicVariable::symbolic("caller"),
            }],
            ..Default::default()
        };
        let pc_to_block: PcToBlock = [(1u64, 0usize), (4, 1), (8, 7)].into_iter().collect();
        let mut blocks = vec![view(0), view(1)];

        let stats = tag_blocks(&summary, &mut blocks, &pc_to_block);
        assert_eq!(stats, TagStats { tagged: 3, skipped: 1 });
        assert_eq!(names(&blocks[0]), vec!["selfdestruct", "push"]);
        assert_eq!(names(&blocks[1]), vec!["revert"]);
    }

    #[test]
    fn test_function_attribution_last_writer_wins() {
        let function = |name: &str, pcs: Vec<u64>| FunctionSummary {
            tags: Tags::new(),
            name: name.to_string(),
            pcs,
            has_writes: false,
            has_reads: false,
            has_logs: false,
            has_calls: false,
            has_delegate: false,
            has_creates: false,
            has_create2s: false,
            has_selfdestructs: false,
        };
        let summary = SymbolicSummary {
            functions: vec![function("a", vec![0, 1]), function("b", vec![1, 50])],
            ..Default::default()
        };
        let pc_to_block: PcToBlock = [(0u64, 0usize), (1, 1)].into_iter().collect();
        let mut blocks = vec![view(0), view(1)];

        let stats = add_symbolics(&summary, &mut blocks, &pc_to_block);
        assert_eq!(stats.skipped, 1);
        assert_eq!(blocks[0].function.as_deref(), Some("a"));
        assert_eq!(blocks[1].function.as_deref(), Some("b"));
    }
}
