//! A small contract and builders for coordinators and services.
//!
//! ```text
//! block 0: PUSH1 (pc 0), SLOAD (pc 2), JUMPI (pc 3)   taken -> pc 10, fall-through raw 4
//! block 1: LOG1 (pc 4), STOP (pc 5)
//! block 2: JUMPDEST (pc 10), SELFDESTRUCT (pc 11)      function kill()
//! ```

use std::sync::Arc;

use ctrleth::config::EngineArgs;
use ctrleth::coordinator::{CoordinatorOptions, RequestCoordinator};
use ctrleth::engine::AnalysisEngine;
use ctrleth::service::DisassemblyService;
use ctrleth_cache::{DocumentStore, KeyValueCache};
use ctrleth_resolver::{ChainStateProvider, SignatureIndex};
use ctrleth_types::annotation::{
    FunctionEntrypoint, JumpTarget, Log, Selfdestruct, StorageLoad, ValueFact,
};
use ctrleth_types::{
    AssemblySummary, EngineOutput, FunctionSummary, Instruction, Opcode, RawBlock,
    SymbolicSummary, SymbolicVariable, Tags, Word,
};
use tokio::runtime::Handle;

pub const ADDRESS: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
pub const OTHER_ADDRESS: &str = "0x6b175474e89094c44da98b954eedeac495271d0f";

pub const SENT_TOPIC: &str = "0x1c9f0c65ac3c9ec3bef182b74cf932aed4751e92e30545a1b1643173c757f348";
pub const SENT: &str = "Sent(uint256,uint256,bytes32,uint256[],address,uint256,bytes32,addresss)";

pub fn instruction(pc: u64, name: &str) -> Instruction {
    Instruction::new(Opcode {
        opcode: 0,
        name: name.to_string(),
        operand_size: 0,
        pops: 0,
        pushes: 0,
        fee: 0,
        description: String::new(),
        operand: None,
        pc,
    })
}

/// `"Wrapped Ether"` as Solidity stores a short string.
pub fn wrapped_ether() -> Vec<u8> {
    let mut word = vec![0u8; 32];
    word[..13].copy_from_slice(b"Wrapped Ether");
    word[31] = 26;
    word
}

pub fn sample_output() -> EngineOutput {
    let blocks = vec![
        RawBlock {
            instructions: vec![
                instruction(0, "PUSH1"),
                instruction(2, "SLOAD"),
                instruction(3, "JUMPI"),
            ],
            next_block_index: Some(1),
            true_branch: Some(10),
            false_branch: Some(4),
            ..Default::default()
        },
        RawBlock {
            instructions: vec![instruction(4, "LOG1"), instruction(5, "STOP")],
            ..Default::default()
        },
        RawBlock {
            instructions: vec![instruction(10, "JUMPDEST"), instruction(11, "SELFDESTRUCT")],
            ..Default::default()
        },
    ];

    let assembly = AssemblySummary {
        jump_targets: vec![JumpTarget {
            pc: 3,
            tags: Tags::new(),
            target: 10,
        }],
        function_entrypoints: vec![FunctionEntrypoint {
            pc: 10,
            tags: Tags::new(),
            function_name: "kill()".to_string(),
        }],
        jumps: vec![3],
        jumpdests: vec![10],
        unique_instructions_visited: 6,
        total_instructions: 7,
        ..Default::default()
    };

    let symbolic = SymbolicSummary {
        functions: vec![FunctionSummary {
            tags: Tags::new(),
            name: "kill()".to_string(),
            pcs: vec![10, 11],
            has_writes: false,
            has_reads: false,
            has_logs: false,
            has_calls: false,
            has_delegate: false,
            has_creates: false,
            has_create2s: false,
            has_selfdestructs: true,
        }],
        storage_reads: vec![StorageLoad {
            pc: 2,
            tags: Tags::new(),
            slot: SymbolicVariable::concrete(0u64),
            concrete_value: None,
            concrete_value_text: None,
        }],
        logs: vec![Log {
            pc: 4,
            tags: Tags::new(),
            n: 1,
            topic0: Word::parse(SENT_TOPIC).ok().map(SymbolicVariable::Concrete),
            topic1: None,
            topic2: None,
            topic3: None,
            data: None,
            name: None,
        }],
        selfdestructs: vec![Selfdestruct {
            pc: 11,
            tags: Tags::new(),
            address: SymbolicVariable::symbolic("caller"),
        }],
        pushes: vec![ValueFact {
            pc: 0,
            tags: Tags::new(),
            value: Some(Word::from(0u64)),
        }],
        unique_instructions_visited: 4,
        ..Default::default()
    };

    EngineOutput {
        blocks,
        assembly,
        symbolic,
    }
}

pub fn coordinator_with(
    engine: Arc<dyn AnalysisEngine>,
    cache: Arc<dyn KeyValueCache>,
    documents: Arc<dyn DocumentStore>,
    workers: usize,
) -> RequestCoordinator {
    RequestCoordinator::new(
        engine,
        cache,
        documents,
        CoordinatorOptions {
            workers,
            ..Default::default()
        },
        Handle::current(),
    )
}

pub fn service_with(
    coordinator: RequestCoordinator,
    chain: Arc<dyn ChainStateProvider>,
    signatures: Arc<dyn SignatureIndex>,
) -> DisassemblyService {
    DisassemblyService::new(coordinator, chain, signatures).with_engine_defaults(EngineArgs {
        rpc: Some("http://localhost:8545".to_string()),
        ..Default::default()
    })
}
