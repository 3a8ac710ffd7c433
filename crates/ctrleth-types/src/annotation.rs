//! Per-instruction facts reported by the analysis engine.
//!
//! Every fact kind is a variant of the closed [`Annotation`] enum. On the wire
//! an annotation is self-describing: `{"_class": "StorageLoad", "data": {...}}`,
//! which is the shape the web client and stored documents expect.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::word::Word;

/// Free-form tags attached to a fact by the engine.
pub type Tags = BTreeMap<String, Value>;

// =============================================================================
// Operand values
// =============================================================================

/// An operand that is either a known constant or an opaque symbolic expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "VariableRepr", into = "VariableRepr")]
pub enum SymbolicVariable {
    Concrete(Word),
    Symbolic(String),
}

impl SymbolicVariable {
    pub fn concrete(value: impl Into<Word>) -> Self {
        Self::Concrete(value.into())
    }

    pub fn symbolic(expression: impl Into<String>) -> Self {
        Self::Symbolic(expression.into())
    }

    /// The constant value, if the operand reduced to one.
    pub fn as_concrete(&self) -> Option<&Word> {
        match self {
            Self::Concrete(word) => Some(word),
            Self::Symbolic(_) => None,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Self::Symbolic(_))
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct VariableRepr {
    var: Value,
    #[serde(default)]
    symbolic: bool,
}

impl From<VariableRepr> for SymbolicVariable {
    fn from(repr: VariableRepr) -> Self {
        let text = match repr.var {
            Value::String(s) => s,
            other if !repr.symbolic => match serde_json::from_value::<Word>(other.clone()) {
                Ok(word) => return Self::Concrete(word),
                Err(_) => other.to_string(),
            },
            other => other.to_string(),
        };
        // Engine expressions look like `s(...)`; anything that is not an
        // integer literal stays symbolic.
        if repr.symbolic || text.starts_with("s(") {
            return Self::Symbolic(text);
        }
        match Word::parse(&text) {
            Ok(word) => Self::Concrete(word),
            Err(_) => Self::Symbolic(text),
        }
    }
}

impl From<SymbolicVariable> for VariableRepr {
    fn from(var: SymbolicVariable) -> Self {
        match var {
            SymbolicVariable::Concrete(word) => VariableRepr {
                var: serde_json::to_value(word).unwrap_or(Value::Null),
                symbolic: false,
            },
            SymbolicVariable::Symbolic(expr) => VariableRepr {
                var: Value::String(expr),
                symbolic: true,
            },
        }
    }
}

/// Opaque description of a memory region or symbolic expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct MemorySlice(pub Value);

// =============================================================================
// Symbolic-execution facts
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub pc: u64,
    #[serde(default)]
    pub tags: Tags,
    pub to: SymbolicVariable,
    pub gas: SymbolicVariable,
    #[serde(rename = "type")]
    pub call_type: SymbolicVariable,
    pub value: SymbolicVariable,
    pub data: MemorySlice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageLoad {
    pub pc: u64,
    #[serde(default)]
    pub tags: Tags,
    pub slot: SymbolicVariable,
    /// Live value read from the chain at load time.
    #[serde(
        rename = "concreteValue",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub concrete_value: Option<String>,
    #[serde(
        rename = "concreteValueText",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub concrete_value_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageWrite {
    pub pc: u64,
    #[serde(default)]
    pub tags: Tags,
    pub slot: SymbolicVariable,
    pub value: SymbolicVariable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryLoad {
    pub pc: u64,
    #[serde(default)]
    pub tags: Tags,
    pub slot: SymbolicVariable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryWrite {
    pub pc: u64,
    #[serde(default)]
    pub tags: Tags,
    pub slot: SymbolicVariable,
    pub value: SymbolicVariable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    pub pc: u64,
    #[serde(default)]
    pub tags: Tags,
    pub n: u8,
    #[serde(default)]
    pub topic0: Option<SymbolicVariable>,
    #[serde(default)]
    pub topic1: Option<SymbolicVariable>,
    #[serde(default)]
    pub topic2: Option<SymbolicVariable>,
    #[serde(default)]
    pub topic3: Option<SymbolicVariable>,
    #[serde(default)]
    pub data: Option<MemorySlice>,
    /// Human readable event signature(s) resolved from `topic0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// RETURN or REVERT payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Halt {
    pub pc: u64,
    #[serde(default)]
    pub tags: Tags,
    pub data: MemorySlice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calldataload {
    pub pc: u64,
    #[serde(default)]
    pub tags: Tags,
    pub offset: SymbolicVariable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calldatacopy {
    pub pc: u64,
    #[serde(default)]
    pub tags: Tags,
    pub offset: SymbolicVariable,
    pub mem_addr: SymbolicVariable,
    pub length: SymbolicVariable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selfdestruct {
    pub pc: u64,
    #[serde(default)]
    pub tags: Tags,
    pub address: SymbolicVariable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalJump {
    pub pc: u64,
    #[serde(default)]
    pub tags: Tags,
    pub to: SymbolicVariable,
    #[serde(default)]
    pub condition: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnconditionalJump {
    pub pc: u64,
    #[serde(default)]
    pub tags: Tags,
    pub to: SymbolicVariable,
}

/// PUSH, CREATE and CREATE2 share this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueFact {
    pub pc: u64,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub value: Option<Word>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderConstraintFunction {
    pub pc: u64,
    #[serde(default)]
    pub tags: Tags,
    pub address: SymbolicVariable,
    #[serde(default)]
    pub condition: Value,
    #[serde(default)]
    pub model: Value,
    #[serde(default = "default_true")]
    pub is_storage_address: bool,
    #[serde(default)]
    pub is_probably_mapping: bool,
    #[serde(default)]
    pub true_branch_reachable: bool,
    #[serde(default)]
    pub false_branch_reachable: bool,
}

fn default_true() -> bool {
    true
}

/// A function discovered by symbolic execution, with the pcs it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSummary {
    #[serde(default)]
    pub tags: Tags,
    pub name: String,
    #[serde(default)]
    pub pcs: Vec<u64>,
    #[serde(default)]
    pub has_writes: bool,
    #[serde(default)]
    pub has_reads: bool,
    #[serde(default)]
    pub has_logs: bool,
    #[serde(default)]
    pub has_calls: bool,
    #[serde(default)]
    pub has_delegate: bool,
    #[serde(default)]
    pub has_creates: bool,
    #[serde(default)]
    pub has_create2s: bool,
    #[serde(default)]
    pub has_selfdestructs: bool,
}

impl FunctionSummary {
    pub fn valid_at(&self, pc: u64) -> bool {
        self.pcs.contains(&pc)
    }
}

// =============================================================================
// Trace (disassembly) facts
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JumpTarget {
    pub pc: u64,
    #[serde(default)]
    pub tags: Tags,
    pub target: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionEntrypoint {
    pub pc: u64,
    #[serde(default)]
    pub tags: Tags,
    pub function_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantSummary {
    #[serde(default)]
    pub tags: Tags,
    pub length: u64,
    pub value: Word,
    #[serde(default)]
    pub introduced_at: Vec<u64>,
}

// =============================================================================
// Annotation
// =============================================================================

/// A single fact attributed to an instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_class", content = "data")]
pub enum Annotation {
    Call(Call),
    StorageLoad(StorageLoad),
    StorageWrite(StorageWrite),
    MemoryLoad(MemoryLoad),
    MemoryWrite(MemoryWrite),
    Log(Log),
    Return(Halt),
    Revert(Halt),
    Calldataload(Calldataload),
    Calldatacopy(Calldatacopy),
    Selfdestruct(Selfdestruct),
    ConditionalJump(ConditionalJump),
    UnconditionalJump(UnconditionalJump),
    Push(ValueFact),
    Create(ValueFact),
    Create2(ValueFact),
    SenderConstraintFunction(SenderConstraintFunction),
    FunctionSummary(FunctionSummary),
    JumpTarget(JumpTarget),
    FunctionEntrypoint(FunctionEntrypoint),
    ConstantSummary(ConstantSummary),
}

impl Annotation {
    /// Semantic class name, identical to the serialized `_class` tag.
    pub fn class_name(&self) -> &'static str {
        match self {
            Annotation::Call(_) => "Call",
            Annotation::StorageLoad(_) => "StorageLoad",
            Annotation::StorageWrite(_) => "StorageWrite",
            Annotation::MemoryLoad(_) => "MemoryLoad",
            Annotation::MemoryWrite(_) => "MemoryWrite",
            Annotation::Log(_) => "Log",
            Annotation::Return(_) => "Return",
            Annotation::Revert(_) => "Revert",
            Annotation::Calldataload(_) => "Calldataload",
            Annotation::Calldatacopy(_) => "Calldatacopy",
            Annotation::Selfdestruct(_) => "Selfdestruct",
            Annotation::ConditionalJump(_) => "ConditionalJump",
            Annotation::UnconditionalJump(_) => "UnconditionalJump",
            Annotation::Push(_) => "Push",
            Annotation::Create(_) => "Create",
            Annotation::Create2(_) => "Create2",
            Annotation::SenderConstraintFunction(_) => "SenderConstraintFunction",
            Annotation::FunctionSummary(_) => "FunctionSummary",
            Annotation::JumpTarget(_) => "JumpTarget",
            Annotation::FunctionEntrypoint(_) => "FunctionEntrypoint",
            Annotation::ConstantSummary(_) => "ConstantSummary",
        }
    }

    /// The single pc this fact is attributed to, if it has one.
    pub fn pc(&self) -> Option<u64> {
        match self {
            Annotation::Call(a) => Some(a.pc),
            Annotation::StorageLoad(a) => Some(a.pc),
            Annotation::StorageWrite(a) => Some(a.pc),
            Annotation::MemoryLoad(a) => Some(a.pc),
            Annotation::MemoryWrite(a) => Some(a.pc),
            Annotation::Log(a) => Some(a.pc),
            Annotation::Return(a) | Annotation::Revert(a) => Some(a.pc),
            Annotation::Calldataload(a) => Some(a.pc),
            Annotation::Calldatacopy(a) => Some(a.pc),
            Annotation::Selfdestruct(a) => Some(a.pc),
            Annotation::ConditionalJump(a) => Some(a.pc),
            Annotation::UnconditionalJump(a) => Some(a.pc),
            Annotation::Push(a) | Annotation::Create(a) | Annotation::Create2(a) => Some(a.pc),
            Annotation::SenderConstraintFunction(a) => Some(a.pc),
            Annotation::JumpTarget(a) => Some(a.pc),
            Annotation::FunctionEntrypoint(a) => Some(a.pc),
            Annotation::FunctionSummary(_) | Annotation::ConstantSummary(_) => None,
        }
    }

    /// Whether the fact's validity interval covers `pc`.
    pub fn valid_at(&self, pc: u64) -> bool {
        match self {
            Annotation::FunctionSummary(f) => f.valid_at(pc),
            Annotation::ConstantSummary(c) => c.introduced_at.contains(&pc),
            other => other.pc() == Some(pc),
        }
    }

    /// Every pc covered by the validity interval.
    pub fn valid_pcs(&self) -> Vec<u64> {
        match self {
            Annotation::FunctionSummary(f) => f.pcs.clone(),
            Annotation::ConstantSummary(c) => c.introduced_at.clone(),
            other => other.pc().into_iter().collect(),
        }
    }
}
