//! Assembling engine output into an [`AnalysisResult`].

use std::collections::HashSet;

use ctrleth_types::annotation::FunctionEntrypoint;
use ctrleth_types::{
    AnalysisResult, AssemblySummary, BasicBlock, Coverage, EngineOutput, EntryPoint,
    FunctionOverview, FunctionSummary, JumpEdge, PcToBlock, RawBlock, SymbolicSummary,
};
use tracing::debug;

use crate::merge::AnnotationMerger;

/// Map every instruction pc to the index of its block.
pub fn build_pc_index(blocks: &[RawBlock]) -> PcToBlock {
    blocks
        .iter()
        .enumerate()
        .flat_map(|(i, block)| block.instructions.iter().map(move |inst| (inst.pc(), i)))
        .collect()
}

/// Edges leaving block `i`.
///
/// The taken branch is emitted only when its pc resolves to a block. With
/// `conditional`, the fall-through is always emitted with `condition: false`
/// and its raw value as target, resolved or not.
pub fn generate_jumps(
    block: &RawBlock,
    i: usize,
    pc_to_block: &PcToBlock,
    conditional: bool,
) -> Vec<JumpEdge> {
    let mut jumps = Vec::new();
    if let Some(target) = block.true_branch.and_then(|pc| pc_to_block.get(pc)) {
        jumps.push(JumpEdge::unconditional(i, target));
    }
    if conditional {
        if let Some(false_jump) = block.false_branch {
            jumps.push(JumpEdge::conditional(i, false_jump as usize, false));
        }
    }
    jumps
}

/// Derive the edge list from the declared jump targets. A target reported
/// more than once contributes its edges once, in first-seen order.
pub fn derive_edges(
    blocks: &[RawBlock],
    assembly: &AssemblySummary,
    pc_to_block: &PcToBlock,
) -> Vec<JumpEdge> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for jump in &assembly.jump_targets {
        let Some(i) = pc_to_block.get(jump.pc) else {
            debug!(pc = jump.pc, "jump target outside decoded blocks");
            continue;
        };
        let Some(block) = blocks.get(i) else {
            continue;
        };
        let edges = if block.is_static_jump_block() {
            generate_jumps(block, i, pc_to_block, false)
        } else if block.is_conditional_jump_block() {
            generate_jumps(block, i, pc_to_block, true)
        } else {
            continue;
        };
        for edge in edges {
            if seen.insert(edge) {
                links.push(edge);
            }
        }
    }
    links
}

/// First declared entrypoint inside the function's pc set that resolves to a block.
pub fn entrypoint_by_function(
    function: &FunctionSummary,
    entrypoints: &[FunctionEntrypoint],
    pc_to_block: &PcToBlock,
) -> Option<EntryPoint> {
    let found = entrypoints.iter().find(|e| function.valid_at(e.pc))?;
    let block = pc_to_block.get(found.pc)?;
    Some(EntryPoint {
        block,
        function_name: found.function_name.clone(),
    })
}

pub fn function_overviews(
    symbolic: &SymbolicSummary,
    assembly: &AssemblySummary,
    pc_to_block: &PcToBlock,
) -> Vec<FunctionOverview> {
    symbolic
        .functions
        .iter()
        .map(|function| FunctionOverview {
            entrypoint: entrypoint_by_function(
                function,
                &assembly.function_entrypoints,
                pc_to_block,
            ),
            function: function.clone(),
        })
        .collect()
}

/// Both passes are measured against the trace's instruction total; zero total
/// means zero coverage.
pub fn coverage(assembly: &AssemblySummary, symbolic: &SymbolicSummary) -> Coverage {
    if assembly.total_instructions == 0 {
        return Coverage::default();
    }
    let total = assembly.total_instructions as f64;
    Coverage {
        assembly: (assembly.unique_instructions_visited as f64 / total).min(1.0),
        symbolic: (symbolic.unique_instructions_visited as f64 / total).min(1.0),
    }
}

/// Run the full assembly pipeline over one engine output.
///
/// Edges are derived from the raw blocks before they are converted, since
/// derivation inspects terminal instructions and branch targets that the
/// assembled form no longer carries.
pub fn assemble(contract: &str, output: EngineOutput) -> AnalysisResult {
    let EngineOutput {
        mut blocks,
        assembly,
        symbolic,
    } = output;

    let pc_to_block = build_pc_index(&blocks);
    let merger = AnnotationMerger::new(&assembly, &symbolic);
    for block in &mut blocks {
        merger.merge_block(block);
    }

    let links = derive_edges(&blocks, &assembly, &pc_to_block);
    let functions = function_overviews(&symbolic, &assembly, &pc_to_block);
    let coverage = coverage(&assembly, &symbolic);

    let blocks: Vec<BasicBlock> = blocks
        .into_iter()
        .enumerate()
        .map(|(i, raw)| BasicBlock {
            i,
            instructions: raw.instructions,
            annotations: raw.annotations,
            next_block_index: raw.next_block_index,
        })
        .collect();

    debug!(
        contract,
        blocks = blocks.len(),
        links = links.len(),
        functions = functions.len(),
        "assembled analysis"
    );

    AnalysisResult {
        contract: contract.to_string(),
        blocks,
        links,
        pc_to_block,
        symbolic_summary: symbolic,
        functions,
        coverage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{instruction, raw_block};
    use ctrleth_types::annotation::JumpTarget;
    use ctrleth_types::Tags;

    fn index(pairs: &[(u64, usize)]) -> PcToBlock {
        pairs.iter().copied().collect()
    }

    fn jump_block(true_branch: u64) -> RawBlock {
        RawBlock {
            true_branch: Some(true_branch),
            ..raw_block(vec![instruction(1, "JUMP")])
        }
    }

    #[test]
    fn test_unresolved_true_branch_yields_nothing() {
        let block = jump_block(2);
        assert!(generate_jumps(&block, 2, &index(&[(20, 3), (5, 1)]), false).is_empty());
    }

    #[test]
    fn test_resolved_true_branch() {
        let block = jump_block(20);
        assert_eq!(
            generate_jumps(&block, 2, &index(&[(20, 4)]), false),
            vec![JumpEdge::unconditional(2, 4)]
        );
    }

    #[test]
    fn test_false_branch_kept_raw() {
        let block = RawBlock {
            true_branch: Some(20),
            false_branch: Some(4),
            ..raw_block(vec![instruction(1, "JUMPI")])
        };
        assert_eq!(
            generate_jumps(&block, 2, &PcToBlock::new(), true),
            vec![JumpEdge::conditional(2, 4, false)]
        );
    }

    #[test]
    fn test_pc_index_covers_every_instruction() {
        let blocks = vec![
            raw_block(vec![instruction(0, "PUSH1"), instruction(2, "JUMP")]),
            raw_block(vec![instruction(3, "JUMPDEST"), instruction(4, "STOP")]),
        ];
        let pc_to_block = build_pc_index(&blocks);
        assert_eq!(pc_to_block.len(), 4);
        for (pc, i) in pc_to_block.iter() {
            assert!(i < blocks.len());
            assert!(blocks[i].instructions.iter().any(|inst| inst.pc() == pc));
        }
    }

    #[test]
    fn test_derive_edges_dedupes() {
        let blocks = vec![
            RawBlock {
                true_branch: Some(5),
                false_branch: Some(1),
                ..raw_block(vec![instruction(0, "PUSH1"), instruction(2, "JUMPI")])
            },
            raw_block(vec![instruction(3, "STOP")]),
            raw_block(vec![instruction(5, "JUMPDEST"), instruction(6, "STOP")]),
        ];
        let target = |pc| JumpTarget {
            pc,
            tags: Tags::new(),
            target: 5,
        };
        let assembly = AssemblySummary {
            jump_targets: vec![target(2), target(2), target(99)],
            ..Default::default()
        };
        let edges = derive_edges(&blocks, &assembly, &build_pc_index(&blocks));
        assert_eq!(
            edges,
            vec![
                JumpEdge::unconditional(0, 2),
                JumpEdge::conditional(0, 1, false)
            ]
        );
    }

    #[test]
    fn test_coverage_zero_total() {
        let assembly = AssemblySummary {
            unique_instructions_visited: 10,
            ..Default::default()
        };
        assert_eq!(coverage(&assembly, &SymbolicSummary::default()), Coverage::default());

        let assembly = AssemblySummary {
            unique_instructions_visited: 50,
            total_instructions: 100,
            ..Default::default()
        };
        let symbolic = SymbolicSummary {
            unique_instructions_visited: 25,
            ..Default::default()
        };
        let c = coverage(&assembly, &symbolic);
        assert_eq!(c.assembly, 0.5);
        assert_eq!(c.symbolic, 0.25);
    }

    #[test]
    fn test_entrypoint_requires_resolvable_pc() {
        let function = FunctionSummary {
            tags: Tags::new(),
            name: "transfer".to_string(),
            pcs: vec![7, 8],
            has_writes: true,
            has_reads: false,
            has_logs: false,
            has_calls: false,
            has_delegate: false,
            has_creates: false,
            has_create2s: false,
            has_selfdestructs: false,
        };
        let entry = |pc| FunctionEntrypoint {
            pc,
            tags: Tags::new(),
            function_name: "transfer(address,uint256)".to_string(),
        };
        assert_eq!(
            entrypoint_by_function(&function, &[entry(3), entry(8)], &index(&[(8, 2)])),
            Some(EntryPoint {
                block: 2,
                function_name: "transfer(address,uint256)".to_string()
            })
        );
        assert_eq!(
            entrypoint_by_function(&function, &[entry(7)], &index(&[(8, 2)])),
            None
        );
    }
}
