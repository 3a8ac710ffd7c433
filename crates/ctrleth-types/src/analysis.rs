//! The assembled analysis result and the views served to readers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::annotation::FunctionSummary;
use crate::block::{BasicBlock, Instruction};
use crate::summary::SymbolicSummary;

/// A derived control-flow edge between two blocks.
///
/// `condition` is absent for static jumps. The false branch of a conditional
/// jump carries the engine's raw fall-through value in `target`, which is not
/// guaranteed to be a valid block index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JumpEdge {
    pub source: usize,
    pub target: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<bool>,
}

impl JumpEdge {
    pub fn unconditional(source: usize, target: usize) -> Self {
        Self {
            source,
            target,
            condition: None,
        }
    }

    pub fn conditional(source: usize, target: usize, condition: bool) -> Self {
        Self {
            source,
            target,
            condition: Some(condition),
        }
    }
}

/// Maps every instruction pc to the index of the block that owns it.
///
/// JSON objects only have string keys; the map's keys still decode back to
/// integers because the key type is `u64`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PcToBlock(BTreeMap<u64, usize>);

impl PcToBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pc: u64, block: usize) {
        self.0.insert(pc, block);
    }

    pub fn get(&self, pc: u64) -> Option<usize> {
        self.0.get(&pc).copied()
    }

    pub fn contains(&self, pc: u64) -> bool {
        self.0.contains_key(&pc)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, usize)> + '_ {
        self.0.iter().map(|(pc, block)| (*pc, *block))
    }
}

impl FromIterator<(u64, usize)> for PcToBlock {
    fn from_iter<T: IntoIterator<Item = (u64, usize)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Fraction of instructions exercised by each analysis pass, in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coverage {
    pub assembly: f64,
    pub symbolic: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub block: usize,
    #[serde(rename = "functionName")]
    pub function_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionOverview {
    pub entrypoint: Option<EntryPoint>,
    pub function: FunctionSummary,
}

/// Result of one successful analysis run. Immutable once cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub contract: String,
    pub blocks: Vec<BasicBlock>,
    pub links: Vec<JumpEdge>,
    pub pc_to_block: PcToBlock,
    pub symbolic_summary: SymbolicSummary,
    pub functions: Vec<FunctionOverview>,
    pub coverage: Coverage,
}

// =============================================================================
// Block type tags
// =============================================================================

/// Semantic tag rendered on a block. Declaration order is display priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockType {
    Selfdestruct,
    Calls,
    Creates,
    Revert,
    Returns,
    Logs,
    Calldataloads,
    Calldatacopies,
    StorageReads,
    StorageWrites,
    MemoryReads,
    MemoryWrites,
    Push,
}

impl BlockType {
    /// Highest priority first.
    pub const PRIORITY: [BlockType; 13] = [
        BlockType::Selfdestruct,
        BlockType::Calls,
        BlockType::Creates,
        BlockType::Revert,
        BlockType::Returns,
        BlockType::Logs,
        BlockType::Calldataloads,
        BlockType::Calldatacopies,
        BlockType::StorageReads,
        BlockType::StorageWrites,
        BlockType::MemoryReads,
        BlockType::MemoryWrites,
        BlockType::Push,
    ];

    /// 1 is rendered first.
    pub fn priority(self) -> u8 {
        Self::PRIORITY
            .iter()
            .position(|t| *t == self)
            .map(|p| p as u8 + 1)
            .unwrap_or(u8::MAX)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Selfdestruct => "selfdestruct",
            BlockType::Calls => "calls",
            BlockType::Creates => "creates",
            BlockType::Revert => "revert",
            BlockType::Returns => "returns",
            BlockType::Logs => "logs",
            BlockType::Calldataloads => "calldataloads",
            BlockType::Calldatacopies => "calldatacopies",
            BlockType::StorageReads => "storageReads",
            BlockType::StorageWrites => "storageWrites",
            BlockType::MemoryReads => "memoryReads",
            BlockType::MemoryWrites => "memoryWrites",
            BlockType::Push => "push",
        }
    }
}

impl FromStr for BlockType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Self::PRIORITY
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow!("Unknown block type '{}'", s))
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Read-side views
// =============================================================================

/// A block as served to readers, with its derived tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockView {
    pub i: usize,
    pub instructions: Vec<Instruction>,
    pub next: Option<usize>,
    pub types: Vec<BlockType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

impl From<BasicBlock> for BlockView {
    fn from(block: BasicBlock) -> Self {
        Self {
            i: block.i,
            instructions: block.instructions,
            next: block.next_block_index,
            types: Vec::new(),
            function: None,
        }
    }
}

/// Complete graph payload returned by `load_analysis`. Never paginated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullResult {
    pub blocks: Vec<BlockView>,
    pub links: Vec<JumpEdge>,
    pub functions: Vec<FunctionOverview>,
    pub coverage: Coverage,
}
