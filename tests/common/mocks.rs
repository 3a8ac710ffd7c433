//! Fakes for the external collaborators.
//!
//! Each fake is a plain trait implementation built per test; nothing here is
//! global.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use ctrleth::config::EngineArgs;
use ctrleth::engine::AnalysisEngine;
use ctrleth_resolver::{ChainStateProvider, SignatureIndex};
use ctrleth_types::{EngineOutput, TaskError, Word};

/// A latch that holds engine calls until opened.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    pub fn closed() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.changed.notify_all();
    }

    /// Blocks until opened; gives up after ten seconds so a broken test
    /// cannot hang the suite.
    pub fn wait(&self) {
        let guard = self.open.lock().unwrap();
        let _ = self
            .changed
            .wait_timeout_while(guard, Duration::from_secs(10), |open| !*open)
            .unwrap();
    }
}

enum Behavior {
    Output(EngineOutput),
    Envelope(TaskError),
    Error(String),
    Panic,
}

pub struct FakeEngine {
    behavior: Behavior,
    gate: Option<Arc<Gate>>,
    calls: AtomicUsize,
}

impl FakeEngine {
    pub fn returning(output: EngineOutput) -> Self {
        Self::with_behavior(Behavior::Output(output))
    }

    pub fn failing_with(envelope: TaskError) -> Self {
        Self::with_behavior(Behavior::Envelope(envelope))
    }

    pub fn erroring(message: &str) -> Self {
        Self::with_behavior(Behavior::Error(message.to_string()))
    }

    pub fn panicking() -> Self {
        Self::with_behavior(Behavior::Panic)
    }

    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn gated(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AnalysisEngine for FakeEngine {
    fn analyze(&self, _address: &str, _args: &EngineArgs) -> Result<EngineOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        match &self.behavior {
            Behavior::Output(output) => Ok(output.clone()),
            Behavior::Envelope(envelope) => Err(envelope.clone().into()),
            Behavior::Error(message) => Err(anyhow!("{}", message)),
            Behavior::Panic => panic!("engine crashed"),
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Chain state keyed by minimal slot hex.
pub struct FakeChain {
    code: Option<String>,
    storage: HashMap<String, Vec<u8>>,
    storage_calls: AtomicUsize,
}

impl FakeChain {
    /// An account with code and empty storage.
    pub fn contract() -> Self {
        Self::with_code(Some("0x6080604052"))
    }

    pub fn with_code(code: Option<&str>) -> Self {
        Self {
            code: code.map(str::to_string),
            storage: HashMap::new(),
            storage_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_storage(mut self, slot: u64, value: Vec<u8>) -> Self {
        self.storage.insert(Word::from(slot).to_hex(), value);
        self
    }

    pub fn storage_calls(&self) -> usize {
        self.storage_calls.load(Ordering::SeqCst)
    }
}

impl ChainStateProvider for FakeChain {
    fn get_storage_at(&self, _address: &str, slot_hex: &str) -> Result<Option<Vec<u8>>> {
        self.storage_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.storage.get(slot_hex).cloned())
    }

    fn get_code(&self, _address: &str) -> Result<Option<String>> {
        Ok(self.code.clone())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Default)]
pub struct FakeSignatures {
    events: HashMap<String, Vec<String>>,
    functions: HashMap<String, Vec<String>>,
}

impl FakeSignatures {
    pub fn with_event(mut self, topic: &str, names: &[&str]) -> Self {
        self.events
            .insert(topic.to_string(), names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn with_function(mut self, selector: &str, names: &[&str]) -> Self {
        self.functions
            .insert(selector.to_string(), names.iter().map(|n| n.to_string()).collect());
        self
    }
}

impl SignatureIndex for FakeSignatures {
    fn event_name(&self, topic_hex: &str) -> Result<Vec<String>> {
        Ok(self.events.get(topic_hex).cloned().unwrap_or_default())
    }

    fn function_name(&self, selector_hex: &str) -> Result<Vec<String>> {
        Ok(self.functions.get(selector_hex).cloned().unwrap_or_default())
    }
}
