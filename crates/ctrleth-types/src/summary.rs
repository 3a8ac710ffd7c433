//! Engine summaries: the trace (disassembly) summary and the symbolic fact set.

use serde::{Deserialize, Serialize};

use crate::annotation::{
    Annotation, Call, Calldatacopy, Calldataload, ConditionalJump, ConstantSummary,
    FunctionEntrypoint, FunctionSummary, Halt, JumpTarget, Log, MemoryLoad, MemoryWrite,
    Selfdestruct, SenderConstraintFunction, StorageLoad, StorageWrite, UnconditionalJump,
    ValueFact,
};
use crate::block::RawBlock;

/// Something that can report the facts valid at a given pc.
pub trait AnnotationSource {
    fn annotations_valid_at(&self, pc: u64) -> Vec<Annotation>;

    /// Every fact the source carries, in reporting order.
    fn all_annotations(&self) -> Vec<Annotation>;
}

/// Summary of the concrete execution trace over the disassembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AssemblySummary {
    #[serde(default)]
    pub constants: Vec<ConstantSummary>,
    #[serde(default)]
    pub function_entrypoints: Vec<FunctionEntrypoint>,
    #[serde(default)]
    pub jump_targets: Vec<JumpTarget>,
    #[serde(default)]
    pub jumps: Vec<u64>,
    #[serde(default)]
    pub jumpdests: Vec<u64>,
    #[serde(default)]
    pub unique_instructions_visited: u64,
    #[serde(default)]
    pub total_instructions: u64,
}

impl AnnotationSource for AssemblySummary {
    fn annotations_valid_at(&self, pc: u64) -> Vec<Annotation> {
        self.all_annotations()
            .into_iter()
            .filter(|a| a.valid_at(pc))
            .collect()
    }

    fn all_annotations(&self) -> Vec<Annotation> {
        let mut out = Vec::new();
        out.extend(self.jump_targets.iter().cloned().map(Annotation::JumpTarget));
        out.extend(
            self.function_entrypoints
                .iter()
                .cloned()
                .map(Annotation::FunctionEntrypoint),
        );
        out.extend(self.constants.iter().cloned().map(Annotation::ConstantSummary));
        out
    }
}

/// Every fact produced by symbolic execution, grouped by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SymbolicSummary {
    #[serde(default)]
    pub functions: Vec<FunctionSummary>,
    #[serde(default)]
    pub calls: Vec<Call>,
    #[serde(default)]
    pub storage_reads: Vec<StorageLoad>,
    #[serde(default)]
    pub storage_writes: Vec<StorageWrite>,
    #[serde(default)]
    pub memory_reads: Vec<MemoryLoad>,
    #[serde(default)]
    pub memory_writes: Vec<MemoryWrite>,
    #[serde(default)]
    pub logs: Vec<Log>,
    #[serde(default)]
    pub returns: Vec<Halt>,
    #[serde(default)]
    pub reverts: Vec<Halt>,
    #[serde(default)]
    pub calldataloads: Vec<Calldataload>,
    #[serde(default)]
    pub calldatacopies: Vec<Calldatacopy>,
    #[serde(default)]
    pub selfdestructs: Vec<Selfdestruct>,
    #[serde(default)]
    pub conditional_jumps: Vec<ConditionalJump>,
    #[serde(default)]
    pub unconditional_jumps: Vec<UnconditionalJump>,
    #[serde(default)]
    pub pushes: Vec<ValueFact>,
    #[serde(default)]
    pub creates: Vec<ValueFact>,
    #[serde(default)]
    pub create2s: Vec<ValueFact>,
    #[serde(default)]
    pub sender_constraint_functions: Vec<SenderConstraintFunction>,
    #[serde(default)]
    pub unique_instructions_visited: u64,
}

impl AnnotationSource for SymbolicSummary {
    fn annotations_valid_at(&self, pc: u64) -> Vec<Annotation> {
        self.all_annotations()
            .into_iter()
            .filter(|a| a.valid_at(pc))
            .collect()
    }

    /// Function summaries are reported separately and are not part of the
    /// per-instruction stream.
    fn all_annotations(&self) -> Vec<Annotation> {
        let mut out = Vec::new();
        out.extend(self.calls.iter().cloned().map(Annotation::Call));
        out.extend(self.storage_reads.iter().cloned().map(Annotation::StorageLoad));
        out.extend(self.storage_writes.iter().cloned().map(Annotation::StorageWrite));
        out.extend(self.memory_reads.iter().cloned().map(Annotation::MemoryLoad));
        out.extend(self.memory_writes.iter().cloned().map(Annotation::MemoryWrite));
        out.extend(self.logs.iter().cloned().map(Annotation::Log));
        out.extend(self.returns.iter().cloned().map(Annotation::Return));
        out.extend(self.reverts.iter().cloned().map(Annotation::Revert));
        out.extend(self.calldataloads.iter().cloned().map(Annotation::Calldataload));
        out.extend(self.calldatacopies.iter().cloned().map(Annotation::Calldatacopy));
        out.extend(self.selfdestructs.iter().cloned().map(Annotation::Selfdestruct));
        out.extend(
            self.conditional_jumps
                .iter()
                .cloned()
                .map(Annotation::ConditionalJump),
        );
        out.extend(
            self.unconditional_jumps
                .iter()
                .cloned()
                .map(Annotation::UnconditionalJump),
        );
        out.extend(self.pushes.iter().cloned().map(Annotation::Push));
        out.extend(self.creates.iter().cloned().map(Annotation::Create));
        out.extend(self.create2s.iter().cloned().map(Annotation::Create2));
        out.extend(
            self.sender_constraint_functions
                .iter()
                .cloned()
                .map(Annotation::SenderConstraintFunction),
        );
        out
    }
}

/// Everything the analysis engine hands back for one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineOutput {
    pub blocks: Vec<RawBlock>,
    #[serde(default)]
    pub assembly: AssemblySummary,
    #[serde(default)]
    pub symbolic: SymbolicSummary,
}
