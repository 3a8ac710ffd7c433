//! Instructions and basic blocks.

use serde::{Deserialize, Serialize};

use crate::annotation::Annotation;
use crate::word::Word;

/// Opcode metadata for one decoded instruction.
///
/// Field names keep the leading underscore the disassembler emits, which is
/// also what the web client reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opcode {
    #[serde(rename = "_opcode")]
    pub opcode: u8,
    #[serde(rename = "_name")]
    pub name: String,
    #[serde(rename = "_operand_size", default)]
    pub operand_size: u8,
    #[serde(rename = "_pops", default)]
    pub pops: u8,
    #[serde(rename = "_pushes", default)]
    pub pushes: u8,
    #[serde(rename = "_fee", default)]
    pub fee: u64,
    #[serde(rename = "_description", default)]
    pub description: String,
    #[serde(rename = "_operand", default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<Word>,
    #[serde(rename = "_pc")]
    pub pc: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub instruction: Opcode,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            instruction: opcode,
            annotations: Vec::new(),
        }
    }

    pub fn pc(&self) -> u64 {
        self.instruction.pc
    }

    pub fn name(&self) -> &str {
        &self.instruction.name
    }

    pub fn is_jump(&self) -> bool {
        self.instruction.name.eq_ignore_ascii_case("JUMP")
    }

    pub fn is_jumpi(&self) -> bool {
        self.instruction.name.eq_ignore_ascii_case("JUMPI")
    }
}

/// A basic block as produced by the disassembly engine, before assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RawBlock {
    pub instructions: Vec<Instruction>,
    /// Block-scoped annotations, propagated onto instructions during merging.
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(rename = "nextBlockIndex", default)]
    pub next_block_index: Option<usize>,
    /// Pc the terminal jump transfers to when taken.
    #[serde(default)]
    pub true_branch: Option<u64>,
    /// Fall-through target of a conditional jump, as reported by the engine.
    #[serde(default)]
    pub false_branch: Option<u64>,
}

impl RawBlock {
    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// Ends in an unconditional `JUMP`.
    pub fn is_static_jump_block(&self) -> bool {
        self.last_instruction().is_some_and(Instruction::is_jump)
    }

    /// Ends in a `JUMPI`.
    pub fn is_conditional_jump_block(&self) -> bool {
        self.last_instruction().is_some_and(Instruction::is_jumpi)
    }
}

/// An assembled basic block, owned by an [`AnalysisResult`](crate::AnalysisResult).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub i: usize,
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(rename = "nextBlockIndex", default)]
    pub next_block_index: Option<usize>,
}

impl BasicBlock {
    pub fn instruction_at_mut(&mut self, pc: u64) -> Option<&mut Instruction> {
        self.instructions.iter_mut().find(|inst| inst.pc() == pc)
    }
}
