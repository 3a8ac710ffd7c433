//! Read-time enrichment of cached analyses.
//!
//! The analysis itself never touches the chain. When a result is served, the
//! resolvers look up live values for the facts that reduced to constants:
//!
//! - [`StorageResolver`]: storage words for concrete `SLOAD` slots
//! - [`EventResolver`]: event names for concrete `topic0` hashes
//!
//! Both mutate annotation payloads only. Lookup failures and pcs that do not
//! resolve to a block leave the graph as it was.

pub mod events;
pub mod provider;
pub mod storage;

pub use events::EventResolver;
pub use provider::{AggregateProvider, ChainStateProvider, NoopSignatureIndex, SignatureIndex};
pub use storage::{decode_text, StorageResolver};

/// Outcome counts of one resolver pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Annotations that gained a value.
    pub resolved: usize,
    /// Symbolic operands, empty lookups and lookup failures.
    pub unresolved: usize,
    /// Facts whose pc is not in the block index.
    pub skipped: usize,
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::{anyhow, Result};
    use ctrleth_types::annotation::{Log, StorageLoad};
    use ctrleth_types::{
        Annotation, BasicBlock, Instruction, Opcode, SymbolicVariable, Tags, Word,
    };

    use crate::{ChainStateProvider, SignatureIndex};

    #[derive(Default)]
    pub struct FakeChain {
        storage: HashMap<String, Vec<u8>>,
        fail: bool,
        storage_calls: AtomicUsize,
    }

    impl FakeChain {
        pub fn with_storage(slot: u64, value: Vec<u8>) -> Self {
            let mut storage = HashMap::new();
            storage.insert(Word::from(slot).to_hex(), value);
            Self {
                storage,
                ..Default::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn storage_calls(&self) -> usize {
            self.storage_calls.load(Ordering::SeqCst)
        }
    }

    impl ChainStateProvider for FakeChain {
        fn get_storage_at(&self, _address: &str, slot_hex: &str) -> Result<Option<Vec<u8>>> {
            self.storage_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("connection refused"));
            }
            Ok(self.storage.get(slot_hex).cloned())
        }

        fn get_code(&self, _address: &str) -> Result<Option<String>> {
            Ok(Some("0x6080".to_string()))
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    #[derive(Default)]
    pub struct FakeSignatures {
        events: HashMap<String, Vec<String>>,
    }

    impl FakeSignatures {
        pub fn with_event(topic: &str, names: &[&str]) -> Self {
            let mut events = HashMap::new();
            events.insert(
                topic.to_string(),
                names.iter().map(|n| n.to_string()).collect(),
            );
            Self { events }
        }
    }

    impl SignatureIndex for FakeSignatures {
        fn event_name(&self, topic_hex: &str) -> Result<Vec<String>> {
            Ok(self.events.get(topic_hex).cloned().unwrap_or_default())
        }

        fn function_name(&self, _selector_hex: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn instruction(pc: u64, name: &str, annotations: Vec<Annotation>) -> Instruction {
        Instruction {
            instruction: Opcode {
                opcode: 0,
                name: name.to_string(),
                operand_size: 0,
                pops: 0,
                pushes: 0,
                fee: 0,
                description: String::new(),
                operand: None,
                pc,
            },
            annotations,
        }
    }

    pub fn storage_read(pc: u64, slot: u64) -> StorageLoad {
        StorageLoad {
            pc,
            tags: Tags::new(),
            slot: SymbolicVariable::concrete(slot),
            concrete_value: None,
            concrete_value_text: None,
        }
    }

    pub fn log(pc: u64, topic: &str) -> Log {
        Log {
            pc,
            tags: Tags::new(),
            n: 1,
            topic0: Word::parse(topic).ok().map(SymbolicVariable::Concrete),
            topic1: None,
            topic2: None,
            topic3: None,
            data: None,
            name: None,
        }
    }

    pub fn load_block(i: usize, pc: u64, slot: u64) -> BasicBlock {
        BasicBlock {
            i,
            instructions: vec![instruction(
                pc,
                "SLOAD",
                vec![Annotation::StorageLoad(storage_read(pc, slot))],
            )],
            annotations: Vec::new(),
            next_block_index: None,
        }
    }

    pub fn log_block(i: usize, pc: u64, topic: &str) -> BasicBlock {
        BasicBlock {
            i,
            instructions: vec![instruction(pc, "LOG1", vec![Annotation::Log(log(pc, topic))])],
            annotations: Vec::new(),
            next_block_index: None,
        }
    }
}
